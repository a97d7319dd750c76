use crate::{
    catalog::{ItemCatalog, ItemRef, PartCategory},
    descriptor::{CharacterDescriptor, ItemSave},
    error::CharaError,
    race::Race,
};
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt};
use tracing::debug;

/// Appearance and equipment positions, in resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotName {
    Face,
    EarsTail,
    Hair,
    Head,
    Body,
    Hands,
    Legs,
    Feet,
    Earring,
    Neck,
    Wrists,
    LeftRing,
    RightRing,
    MainHand,
    OffHand,
}

impl SlotName {
    pub const ALL: [Self; 15] = [
        Self::Face,
        Self::EarsTail,
        Self::Hair,
        Self::Head,
        Self::Body,
        Self::Hands,
        Self::Legs,
        Self::Feet,
        Self::Earring,
        Self::Neck,
        Self::Wrists,
        Self::LeftRing,
        Self::RightRing,
        Self::MainHand,
        Self::OffHand,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Face => "Face",
            Self::EarsTail => "EarsTail",
            Self::Hair => "Hair",
            Self::Head => "Head",
            Self::Body => "Body",
            Self::Hands => "Hands",
            Self::Legs => "Legs",
            Self::Feet => "Feet",
            Self::Earring => "Earring",
            Self::Neck => "Neck",
            Self::Wrists => "Wrists",
            Self::LeftRing => "L Ring",
            Self::RightRing => "R Ring",
            Self::MainHand => "Weapon Main",
            Self::OffHand => "Weapon Off",
        }
    }

    /// Catalog category searched for armor and accessory slots.
    pub fn gear_category(self) -> Option<&'static str> {
        match self {
            Self::Head => Some("Head"),
            Self::Body => Some("Body"),
            Self::Hands => Some("Hands"),
            Self::Legs => Some("Legs"),
            Self::Feet => Some("Feet"),
            Self::Earring => Some("Earring"),
            Self::Neck => Some("Neck"),
            Self::Wrists => Some("Wrists"),
            Self::LeftRing | Self::RightRing => Some("Rings"),
            _ => None,
        }
    }

    /// Failures in these slots abort the whole character.
    pub fn is_mandatory(self) -> bool {
        matches!(self, Self::Face | Self::Body)
    }

    fn item_save(self, descriptor: &CharacterDescriptor) -> Option<ItemSave> {
        match self {
            Self::Head => descriptor.head_gear,
            Self::Body => descriptor.body,
            Self::Hands => descriptor.hands,
            Self::Legs => descriptor.legs,
            Self::Feet => descriptor.feet,
            Self::Earring => descriptor.ears,
            Self::Neck => descriptor.neck,
            Self::Wrists => descriptor.wrists,
            Self::LeftRing => descriptor.left_ring,
            Self::RightRing => descriptor.right_ring,
            _ => None,
        }
    }
}

impl fmt::Display for SlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Turns descriptor slots into catalog items for one race.
pub struct SlotResolver<'a> {
    catalog: &'a ItemCatalog,
    race: Race,
}

impl<'a> SlotResolver<'a> {
    pub fn new(catalog: &'a ItemCatalog, race: Race) -> Self {
        Self { catalog, race }
    }

    pub fn race(&self) -> Race {
        self.race
    }

    /// `Ok(None)` means nothing occupies the slot.
    pub fn resolve(
        &self,
        descriptor: &CharacterDescriptor,
        slot: SlotName,
    ) -> Result<Option<ItemRef<'a>>, CharaError> {
        let catalog = self.catalog;
        let item = match slot {
            SlotName::Face => catalog
                .find_character_part(self.race, PartCategory::Face, descriptor.head as u16)
                .map(|item| Some(Cow::Owned(item))),
            SlotName::Hair => catalog
                .find_character_part(self.race, PartCategory::Hair, descriptor.hair as u16)
                .map(|item| Some(Cow::Owned(item))),
            SlotName::EarsTail => catalog
                .find_ears_tail(self.race, descriptor.tail_ears_type)
                .map(|item| item.map(Cow::Owned)),
            SlotName::MainHand => catalog
                .find_weapon(descriptor.main_hand.unwrap_or_default(), true)
                .map(|item| item.map(Cow::Borrowed)),
            SlotName::OffHand => catalog
                .find_weapon(descriptor.off_hand.unwrap_or_default(), false)
                .map(|item| item.map(Cow::Borrowed)),
            gear => match gear.gear_category() {
                Some(category) => catalog
                    .find_gear_item(gear.item_save(descriptor).unwrap_or_default(), category)
                    .map(|item| item.map(Cow::Borrowed)),
                None => Ok(None),
            },
        }?;

        match &item {
            Some(item) => debug!(%slot, item = %item.name, "slot resolved to item"),
            None => debug!(%slot, "slot is empty"),
        }
        Ok(item)
    }

    /// Every slot in resolution order, looked up lazily.
    pub fn slots<'d>(
        &'d self,
        descriptor: &'d CharacterDescriptor,
    ) -> impl Iterator<Item = (SlotName, Result<Option<ItemRef<'a>>, CharaError>)> + 'd {
        SlotName::ALL
            .into_iter()
            .map(move |slot| (slot, self.resolve(descriptor, slot)))
    }
}
