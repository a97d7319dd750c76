use crate::{
    descriptor::{ItemSave, WeaponSave},
    error::CharaError,
    race::Race,
};
use nohash_hasher::IntMap;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt, sync::Arc};
use tracing::debug;

/// Model identity of an item: primary id (model set, or race code for character parts),
/// secondary id (body/base id) and variant id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelInfo {
    pub primary_id: u16,
    pub secondary_id: u16,
    pub variant_id: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimaryCategory {
    Character,
    Gear,
}

impl fmt::Display for PrimaryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ItemKind {
    /// Race-scoped body part (face, hair, ears, tail).
    Character,
    /// Armor or accessory.
    Gear,
    Weapon {
        #[serde(default)]
        off_hand: Option<Box<CatalogItem>>,
    },
}

impl ItemKind {
    pub fn primary_category(&self) -> PrimaryCategory {
        match self {
            Self::Character => PrimaryCategory::Character,
            Self::Gear | Self::Weapon { .. } => PrimaryCategory::Gear,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub name: Box<str>,
    pub kind: ItemKind,
    /// Body part or gear slot name, e.g. "Hair" or "Legs".
    pub category: Box<str>,
    pub model: ModelInfo,
}

impl CatalogItem {
    pub fn primary_category(&self) -> PrimaryCategory {
        self.kind.primary_category()
    }

    pub fn off_hand(&self) -> Option<&CatalogItem> {
        match &self.kind {
            ItemKind::Weapon { off_hand } => off_hand.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for CatalogItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} {}: {}/{}/{})",
            self.name,
            self.primary_category(),
            self.category,
            self.model.primary_id,
            self.model.secondary_id,
            self.model.variant_id
        )
    }
}

/// Character part families looked up per race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartCategory {
    Face,
    Hair,
    EarsTail,
}

impl PartCategory {
    pub fn matches(self, category: &str) -> bool {
        match self {
            Self::Face => category == "Face",
            Self::Hair => category == "Hair",
            Self::EarsTail => category == "Ear" || category == "Tail",
        }
    }
}

impl fmt::Display for PartCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Face => "Face",
            Self::Hair => "Hair",
            Self::EarsTail => "Ears/Tail",
        })
    }
}

/// Only these races have ear or tail geometry.
pub const EARS_TAIL_RACES: [Race; 6] = [
    Race::from_code(701),
    Race::from_code(801),
    Race::from_code(1301),
    Race::from_code(1401),
    Race::from_code(1701),
    Race::from_code(1801),
];

/// Read-only index over the full item list, keyed by primary model id.
#[derive(Debug, Default)]
pub struct ItemCatalog {
    items: Vec<CatalogItem>,
    by_primary: IntMap<u16, Vec<usize>>,
}

impl ItemCatalog {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        let mut by_primary: IntMap<u16, Vec<usize>> = IntMap::default();
        for (idx, item) in items.iter().enumerate() {
            by_primary.entry(item.model.primary_id).or_default().push(idx);
        }
        debug!(items = items.len(), "item catalog indexed");
        Self { items, by_primary }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    fn with_primary(&self, primary_id: u16) -> impl Iterator<Item = &CatalogItem> + '_ {
        self.by_primary
            .get(&primary_id)
            .into_iter()
            .flatten()
            .map(move |idx| &self.items[*idx])
    }

    /// Finds the character part of `part` for `race` and returns a copy carrying
    /// `secondary_id`. The shared entry is never modified.
    pub fn find_character_part(
        &self,
        race: Race,
        part: PartCategory,
        secondary_id: u16,
    ) -> Result<CatalogItem, CharaError> {
        let found = self.with_primary(race.code()).find(|item| {
            item.primary_category() == PrimaryCategory::Character && part.matches(&item.category)
        });

        match found {
            Some(item) => {
                let mut part_item = item.clone();
                part_item.model.secondary_id = secondary_id;
                Ok(part_item)
            }
            None => Err(CharaError::ModelNotFound(
                format!("{part} model: {race}, {secondary_id}").into_boxed_str(),
            )),
        }
    }

    /// Ears or tail for `race`; `None` for races without either.
    pub fn find_ears_tail(&self, race: Race, id: u8) -> Result<Option<CatalogItem>, CharaError> {
        if !EARS_TAIL_RACES.contains(&race) {
            return Ok(None);
        }
        // Variant 0 does not exist in game data.
        let id = if id == 0 { 1 } else { id };
        self.find_character_part(race, PartCategory::EarsTail, id as u16)
            .map(Some)
    }

    pub fn find_gear_item(
        &self,
        save: ItemSave,
        category: &str,
    ) -> Result<Option<&CatalogItem>, CharaError> {
        if save.is_empty() {
            return Ok(None);
        }

        self.with_primary(save.model_base)
            .find(|item| {
                item.primary_category() == PrimaryCategory::Gear
                    && item.model.variant_id == save.model_variant as u16
                    && &*item.category == category
            })
            .map(Some)
            .ok_or_else(|| {
                CharaError::ModelNotFound(format!("{category} item save: {save}").into_boxed_str())
            })
    }

    /// Weapon matching `save`; for the off hand, the matched weapon's paired item, if any.
    pub fn find_weapon(
        &self,
        save: WeaponSave,
        main_hand: bool,
    ) -> Result<Option<&CatalogItem>, CharaError> {
        if save.is_empty() {
            return Ok(None);
        }

        let weapon = self
            .with_primary(save.model_set)
            .find(|item| {
                matches!(item.kind, ItemKind::Weapon { .. })
                    && item.model.secondary_id == save.model_base
                    && item.model.variant_id == save.model_variant
            })
            .ok_or_else(|| {
                CharaError::ModelNotFound(format!("weapon save: {save}").into_boxed_str())
            })?;

        if main_hand {
            Ok(Some(weapon))
        } else {
            // Two-handed weapons have no paired item; the off hand is then empty.
            Ok(weapon.off_hand())
        }
    }
}

/// Process-wide catalog slot, filled by the first caller and shared afterwards.
#[derive(Debug, Default)]
pub struct SharedCatalog {
    cell: OnceCell<Arc<ItemCatalog>>,
}

impl SharedCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<ItemCatalog>> {
        self.cell.get().cloned()
    }

    /// Returns the catalog, running `load` only if no caller has loaded it yet.
    pub fn get_or_load<F>(&self, load: F) -> Result<Arc<ItemCatalog>, CharaError>
    where
        F: FnOnce() -> Result<Vec<CatalogItem>, CharaError>,
    {
        self.cell
            .get_or_try_init(|| Ok(Arc::new(ItemCatalog::new(load()?))))
            .cloned()
    }
}

/// Borrowed catalog entry or an adjusted copy of one.
pub type ItemRef<'a> = Cow<'a, CatalogItem>;

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, kind: ItemKind, category: &str, ids: (u16, u16, u16)) -> CatalogItem {
        CatalogItem {
            name: name.into(),
            kind,
            category: category.into(),
            model: ModelInfo {
                primary_id: ids.0,
                secondary_id: ids.1,
                variant_id: ids.2,
            },
        }
    }

    fn catalog() -> ItemCatalog {
        let shield = item("Shield", ItemKind::Gear, "Shield", (101, 1, 1));
        ItemCatalog::new(vec![
            item("Hair", ItemKind::Character, "Hair", (1301, 0, 0)),
            item("Face", ItemKind::Character, "Face", (1301, 0, 0)),
            item("Tail", ItemKind::Character, "Tail", (1301, 0, 0)),
            item("Ears", ItemKind::Character, "Ear", (801, 0, 0)),
            item("Cap", ItemKind::Gear, "Head", (6077, 0, 1)),
            item("Coat", ItemKind::Gear, "Body", (6077, 0, 1)),
            item("Coat B", ItemKind::Gear, "Body", (6077, 0, 2)),
            item(
                "Sword",
                ItemKind::Weapon {
                    off_hand: Some(Box::new(shield)),
                },
                "Gladiator's Arm",
                (201, 1, 1),
            ),
            item(
                "Staff",
                ItemKind::Weapon { off_hand: None },
                "Conjurer's Arm",
                (801, 3, 1),
            ),
        ])
    }

    #[test]
    fn character_part_is_cloned() {
        let catalog = catalog();
        let race = Race::from_code(1301);
        let hair = catalog
            .find_character_part(race, PartCategory::Hair, 7)
            .unwrap();
        assert_eq!(&*hair.name, "Hair");
        assert_eq!(hair.model.primary_id, 1301);
        assert_eq!(hair.model.secondary_id, 7);
        assert_eq!(catalog.items()[0].model.secondary_id, 0);

        let again = catalog
            .find_character_part(race, PartCategory::Hair, 7)
            .unwrap();
        assert_eq!(hair, again);
    }

    #[test]
    fn character_part_missing() {
        let catalog = catalog();
        assert!(matches!(
            catalog.find_character_part(Race::from_code(101), PartCategory::Face, 1),
            Err(CharaError::ModelNotFound(_))
        ));
    }

    #[test]
    fn ears_tail_allow_list() {
        let catalog = catalog();
        assert!(catalog
            .find_ears_tail(Race::from_code(101), 3)
            .unwrap()
            .is_none());
        assert!(catalog
            .find_ears_tail(Race::from_code(1501), 0)
            .unwrap()
            .is_none());

        let tail = catalog
            .find_ears_tail(Race::from_code(1301), 0)
            .unwrap()
            .unwrap();
        assert_eq!(&*tail.category, "Tail");
        assert_eq!(tail.model.secondary_id, 1);

        let ears = catalog
            .find_ears_tail(Race::from_code(801), 4)
            .unwrap()
            .unwrap();
        assert_eq!(&*ears.category, "Ear");
        assert_eq!(ears.model.secondary_id, 4);
    }

    #[test]
    fn gear_matches_slot_and_variant() {
        let catalog = catalog();
        let save = ItemSave {
            model_base: 6077,
            model_variant: 2,
        };
        let coat = catalog.find_gear_item(save, "Body").unwrap().unwrap();
        assert_eq!(&*coat.name, "Coat B");

        let cap = catalog
            .find_gear_item(
                ItemSave {
                    model_base: 6077,
                    model_variant: 1,
                },
                "Head",
            )
            .unwrap()
            .unwrap();
        assert_eq!(&*cap.name, "Cap");

        assert!(matches!(
            catalog.find_gear_item(save, "Legs"),
            Err(CharaError::ModelNotFound(_))
        ));
    }

    #[test]
    fn empty_saves_skip_lookup() {
        let empty = ItemCatalog::new(Vec::new());
        assert!(empty
            .find_gear_item(ItemSave::default(), "Body")
            .unwrap()
            .is_none());
        assert!(empty
            .find_weapon(WeaponSave::default(), true)
            .unwrap()
            .is_none());
        assert!(empty
            .find_weapon(WeaponSave::default(), false)
            .unwrap()
            .is_none());
    }

    #[test]
    fn weapons_and_off_hands() {
        let catalog = catalog();
        let save = WeaponSave {
            model_set: 201,
            model_base: 1,
            model_variant: 1,
        };
        assert_eq!(
            &*catalog.find_weapon(save, true).unwrap().unwrap().name,
            "Sword"
        );
        assert_eq!(
            &*catalog.find_weapon(save, false).unwrap().unwrap().name,
            "Shield"
        );

        let staff = WeaponSave {
            model_set: 801,
            model_base: 3,
            model_variant: 1,
        };
        assert!(matches!(catalog.find_weapon(staff, false), Ok(None)));
        assert!(catalog
            .find_weapon(
                WeaponSave {
                    model_set: 201,
                    model_base: 2,
                    model_variant: 1
                },
                true
            )
            .is_err());
    }

    #[test]
    fn shared_catalog_loads_once() {
        let shared = SharedCatalog::new();
        assert!(shared.get().is_none());

        let first = shared.get_or_load(|| Ok(catalog().items().to_vec())).unwrap();
        let second = shared
            .get_or_load(|| Err(CharaError::ModelNotFound("reloaded".into())))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.len(), 9);
    }
}
