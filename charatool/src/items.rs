use anyhow::anyhow;
use chara::catalog::{CatalogItem, ItemKind, ModelInfo};
use fallible_iterator::{FallibleIterator, IteratorExt};
use serde::Deserialize;
use std::{fs, path::Path};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RowKind {
    Character,
    Gear,
    Weapon,
}

/// One line of the item list.
#[derive(Debug, Deserialize)]
struct ItemRow {
    name: Box<str>,
    kind: RowKind,
    category: Box<str>,
    primary: u16,
    secondary: u16,
    variant: u16,
    offhand_primary: Option<u16>,
    offhand_secondary: Option<u16>,
    offhand_variant: Option<u16>,
}

impl ItemRow {
    fn off_hand(&self) -> Option<ModelInfo> {
        Some(ModelInfo {
            primary_id: self.offhand_primary?,
            secondary_id: self.offhand_secondary.unwrap_or(0),
            variant_id: self.offhand_variant.unwrap_or(0),
        })
    }

    fn into_item(self) -> anyhow::Result<CatalogItem> {
        let off_hand = self.off_hand();
        let kind = match (self.kind, off_hand) {
            (RowKind::Character, None) => ItemKind::Character,
            (RowKind::Gear, None) => ItemKind::Gear,
            (RowKind::Weapon, off_hand) => ItemKind::Weapon {
                off_hand: off_hand.map(|model| {
                    Box::new(CatalogItem {
                        name: format!("{} (Off Hand)", self.name).into_boxed_str(),
                        kind: ItemKind::Weapon { off_hand: None },
                        category: self.category.clone(),
                        model,
                    })
                }),
            },
            (_, Some(_)) => return Err(anyhow!("{} has off hand ids but is no weapon", self.name)),
        };

        Ok(CatalogItem {
            name: self.name,
            kind,
            category: self.category,
            model: ModelInfo {
                primary_id: self.primary,
                secondary_id: self.secondary,
                variant_id: self.variant,
            },
        })
    }
}

pub fn read_items(raw: &[u8]) -> anyhow::Result<Vec<CatalogItem>> {
    csv::Reader::from_reader(raw)
        .deserialize::<ItemRow>()
        .transpose_into_fallible()
        .map_err(From::from)
        .map(ItemRow::into_item)
        .collect()
}

pub fn load_items(path: &Path) -> anyhow::Result<Vec<CatalogItem>> {
    let raw = fs::read(path)
        .map_err(|e| anyhow!("Unable to read item list {}: {e}", path.to_string_lossy()))?;
    read_items(&raw)
}
