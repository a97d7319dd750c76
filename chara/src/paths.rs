use crate::{
    catalog::{CatalogItem, ItemKind},
    error::CharaError,
    race::Race,
};

fn equipment_suffix(category: &str) -> Option<&'static str> {
    match category {
        "Head" => Some("met"),
        "Body" => Some("top"),
        "Hands" => Some("glv"),
        "Legs" => Some("dwn"),
        "Feet" => Some("sho"),
        _ => None,
    }
}

fn accessory_suffix(category: &str) -> Option<&'static str> {
    match category {
        "Earring" => Some("ear"),
        "Neck" => Some("nek"),
        "Wrists" => Some("wrs"),
        "Rings" => Some("rir"),
        _ => None,
    }
}

/// Directory name, file marker and file suffix of a character part category.
fn part_names(category: &str) -> Option<(&'static str, char, &'static str)> {
    match category {
        "Face" => Some(("face", 'f', "fac")),
        "Hair" => Some(("hair", 'h', "hir")),
        "Tail" => Some(("tail", 't', "til")),
        "Ear" => Some(("zear", 'z', "zer")),
        _ => None,
    }
}

/// In-game path of the model of `item` as authored for `race`.
///
/// Weapons are race independent. Both ring slots use the right-hand ring model.
pub fn model_path(item: &CatalogItem, race: Race) -> Result<String, CharaError> {
    let model = &item.model;
    let unknown = || CharaError::ModelNotFound(format!("model path of {item}").into_boxed_str());

    let path = match item.kind {
        ItemKind::Weapon { .. } => format!(
            "chara/weapon/w{set:04}/obj/body/b{base:04}/model/w{set:04}b{base:04}.mdl",
            set = model.primary_id,
            base = model.secondary_id,
        ),
        ItemKind::Character => {
            let (dir, marker, suffix) = part_names(&item.category).ok_or_else(unknown)?;
            let id = model.secondary_id;
            format!("chara/human/c{race}/obj/{dir}/{marker}{id:04}/model/c{race}{marker}{id:04}_{suffix}.mdl")
        }
        ItemKind::Gear => {
            let id = model.primary_id;
            if let Some(suffix) = equipment_suffix(&item.category) {
                format!("chara/equipment/e{id:04}/model/c{race}e{id:04}_{suffix}.mdl")
            } else if let Some(suffix) = accessory_suffix(&item.category) {
                format!("chara/accessory/a{id:04}/model/c{race}a{id:04}_{suffix}.mdl")
            } else {
                return Err(unknown());
            }
        }
    };
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModelInfo;

    fn item(category: &str, kind: ItemKind, primary: u16, secondary: u16) -> CatalogItem {
        CatalogItem {
            name: category.into(),
            kind,
            category: category.into(),
            model: ModelInfo {
                primary_id: primary,
                secondary_id: secondary,
                variant_id: 1,
            },
        }
    }

    #[test]
    fn equipment_and_accessories() {
        let race = Race::from_code(201);
        assert_eq!(
            model_path(&item("Body", ItemKind::Gear, 6077, 0), race).unwrap(),
            "chara/equipment/e6077/model/c0201e6077_top.mdl"
        );
        assert_eq!(
            model_path(&item("Legs", ItemKind::Gear, 12, 0), race).unwrap(),
            "chara/equipment/e0012/model/c0201e0012_dwn.mdl"
        );
        assert_eq!(
            model_path(&item("Rings", ItemKind::Gear, 53, 0), race).unwrap(),
            "chara/accessory/a0053/model/c0201a0053_rir.mdl"
        );
    }

    #[test]
    fn weapons_ignore_race() {
        let sword = item("Gladiator's Arm", ItemKind::Weapon { off_hand: None }, 201, 1);
        assert_eq!(
            model_path(&sword, Race::from_code(1301)).unwrap(),
            "chara/weapon/w0201/obj/body/b0001/model/w0201b0001.mdl"
        );
    }

    #[test]
    fn character_parts() {
        let race = Race::from_code(1301);
        assert_eq!(
            model_path(&item("Face", ItemKind::Character, 1301, 3), race).unwrap(),
            "chara/human/c1301/obj/face/f0003/model/c1301f0003_fac.mdl"
        );
        assert_eq!(
            model_path(&item("Tail", ItemKind::Character, 1301, 1), race)
                .unwrap(),
            "chara/human/c1301/obj/tail/t0001/model/c1301t0001_til.mdl"
        );
        assert!(matches!(
            model_path(&item("Hat", ItemKind::Character, 1301, 1), race),
            Err(CharaError::ModelNotFound(_))
        ));
    }
}
