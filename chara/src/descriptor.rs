use crate::{
    error::CharaError,
    race::{Race, RaceGraph},
};
use serde::{de, Deserialize, Serialize};
use std::{fmt, io::Read};

/// Declares a byte-valued enum that deserializes from either its number or its name.
macro_rules! descriptor_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:literal,)+ }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        #[repr(u8)]
        pub enum $name {
            $($variant = $value,)+
        }

        impl $name {
            pub fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $($value => Some(Self::$variant),)+
                    _ => None,
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $(stringify!($variant) => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: de::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct EnumVisitor;

                impl<'de> de::Visitor<'de> for EnumVisitor {
                    type Value = $name;

                    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                        write!(f, concat!(stringify!($name), " name or number"))
                    }

                    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                        u8::try_from(v)
                            .ok()
                            .and_then($name::from_u8)
                            .ok_or_else(|| E::invalid_value(de::Unexpected::Unsigned(v), &self))
                    }

                    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                        u8::try_from(v)
                            .ok()
                            .and_then($name::from_u8)
                            .ok_or_else(|| E::invalid_value(de::Unexpected::Signed(v), &self))
                    }

                    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                        $name::from_name(v)
                            .ok_or_else(|| E::invalid_value(de::Unexpected::Str(v), &self))
                    }
                }

                deserializer.deserialize_any(EnumVisitor)
            }
        }
    };
}

descriptor_enum!(Gender {
    Masculine = 0,
    Feminine = 1,
});

descriptor_enum!(Races {
    Hyur = 1,
    Elezen = 2,
    Lalafel = 3,
    Miqote = 4,
    Roegadyn = 5,
    AuRa = 6,
    Hrothgar = 7,
    Viera = 8,
});

descriptor_enum!(Tribes {
    Midlander = 1,
    Highlander = 2,
    Wildwood = 3,
    Duskwight = 4,
    Plainsfolk = 5,
    Dunesfolk = 6,
    SeekerOfTheSun = 7,
    KeeperOfTheMoon = 8,
    SeaWolf = 9,
    Hellsguard = 10,
    Raen = 11,
    Xaela = 12,
    Helions = 13,
    TheLost = 14,
    Rava = 15,
    Veena = 16,
});

impl Races {
    /// The two tribes belonging to this race.
    pub fn tribes(self) -> [Tribes; 2] {
        match self {
            Self::Hyur => [Tribes::Midlander, Tribes::Highlander],
            Self::Elezen => [Tribes::Wildwood, Tribes::Duskwight],
            Self::Lalafel => [Tribes::Plainsfolk, Tribes::Dunesfolk],
            Self::Miqote => [Tribes::SeekerOfTheSun, Tribes::KeeperOfTheMoon],
            Self::Roegadyn => [Tribes::SeaWolf, Tribes::Hellsguard],
            Self::AuRa => [Tribes::Raen, Tribes::Xaela],
            Self::Hrothgar => [Tribes::Helions, Tribes::TheLost],
            Self::Viera => [Tribes::Rava, Tribes::Veena],
        }
    }
}

/// Armor or accessory slot record. All-zero means nothing is equipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ItemSave {
    pub model_base: u16,
    pub model_variant: u8,
}

impl ItemSave {
    pub fn is_empty(&self) -> bool {
        self.model_base == 0 && self.model_variant == 0
    }
}

impl fmt::Display for ItemSave {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.model_base, self.model_variant)
    }
}

/// Weapon slot record. All-zero means nothing is equipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct WeaponSave {
    pub model_set: u16,
    pub model_base: u16,
    pub model_variant: u16,
}

impl WeaponSave {
    pub fn is_empty(&self) -> bool {
        self.model_set == 0 && self.model_base == 0 && self.model_variant == 0
    }
}

impl fmt::Display for WeaponSave {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}",
            self.model_set, self.model_base, self.model_variant
        )
    }
}

/// Saved character appearance and equipment (`.chara` document).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CharacterDescriptor {
    pub race: Races,
    pub gender: Gender,
    pub tribe: Tribes,
    #[serde(default)]
    pub height: u8,
    #[serde(default)]
    pub head: u8,
    #[serde(default)]
    pub hair: u8,
    #[serde(default)]
    pub eyebrows: u8,
    #[serde(default)]
    pub eyes: u8,
    #[serde(default)]
    pub nose: u8,
    #[serde(default)]
    pub jaw: u8,
    #[serde(default)]
    pub mouth: u8,
    #[serde(default)]
    pub tail_ears_type: u8,
    #[serde(default)]
    pub bust: u8,

    #[serde(default)]
    pub main_hand: Option<WeaponSave>,
    #[serde(default)]
    pub off_hand: Option<WeaponSave>,

    #[serde(default)]
    pub head_gear: Option<ItemSave>,
    #[serde(default)]
    pub body: Option<ItemSave>,
    #[serde(default)]
    pub hands: Option<ItemSave>,
    #[serde(default)]
    pub legs: Option<ItemSave>,
    #[serde(default)]
    pub feet: Option<ItemSave>,
    #[serde(default)]
    pub ears: Option<ItemSave>,
    #[serde(default)]
    pub neck: Option<ItemSave>,
    #[serde(default)]
    pub wrists: Option<ItemSave>,
    #[serde(default)]
    pub left_ring: Option<ItemSave>,
    #[serde(default)]
    pub right_ring: Option<ItemSave>,
}

impl CharacterDescriptor {
    pub fn from_json(json: &str) -> Result<Self, CharaError> {
        serde_json::from_str(json).map_err(CharaError::Descriptor)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, CharaError> {
        serde_json::from_reader(reader).map_err(CharaError::Descriptor)
    }

    /// Maps race, tribe and gender onto a race of `graph`.
    ///
    /// Fails with [`CharaError::UnknownRace`] when the tribe does not belong to the race or
    /// the resulting code is missing from the graph.
    pub fn race(&self, graph: &RaceGraph) -> Result<Race, CharaError> {
        let unknown = || {
            CharaError::UnknownRace(
                format!("{}, {}, {}", self.race, self.tribe, self.gender).into_boxed_str(),
            )
        };

        if !self.race.tribes().contains(&self.tribe) {
            return Err(unknown());
        }

        let base = match (self.race, self.tribe) {
            (Races::Hyur, Tribes::Midlander) => 1,
            (Races::Hyur, _) => 3,
            (Races::Elezen, _) => 5,
            (Races::Miqote, _) => 7,
            (Races::Roegadyn, _) => 9,
            (Races::Lalafel, _) => 11,
            (Races::AuRa, _) => 13,
            (Races::Hrothgar, _) => 15,
            (Races::Viera, _) => 17,
        };
        let gender = match self.gender {
            Gender::Masculine => 0,
            Gender::Feminine => 1,
        };

        let race = Race::from_code((base + gender) * 100 + 1);
        if graph.contains(race) {
            Ok(race)
        } else {
            Err(unknown())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AURA: &str = r#"{
        "Race": "AuRa",
        "Gender": "Masculine",
        "Tribe": "Xaela",
        "Head": 2,
        "Hair": 5,
        "TailEarsType": 0,
        "HeadGear": { "ModelBase": 0, "ModelVariant": 0 },
        "Body": { "ModelBase": 6077, "ModelVariant": 1, "DyeId": 0 },
        "MainHand": { "ModelSet": 201, "ModelBase": 1, "ModelVariant": 1 },
        "SomethingElse": true
    }"#;

    #[test]
    fn parses_named_enums() {
        let chara = CharacterDescriptor::from_json(AURA).unwrap();
        assert_eq!(chara.race, Races::AuRa);
        assert_eq!(chara.tribe, Tribes::Xaela);
        assert_eq!(chara.head, 2);
        assert_eq!(
            chara.body,
            Some(ItemSave {
                model_base: 6077,
                model_variant: 1
            })
        );
        assert!(chara.head_gear.unwrap().is_empty());
        assert!(chara.legs.is_none());
        assert_eq!(chara.main_hand.unwrap().model_set, 201);
    }

    #[test]
    fn parses_numeric_enums() {
        let json = r#"{ "Race": 4, "Gender": 1, "Tribe": 8 }"#;
        let chara = CharacterDescriptor::from_json(json).unwrap();
        assert_eq!(chara.race, Races::Miqote);
        assert_eq!(chara.gender, Gender::Feminine);
        assert_eq!(chara.tribe, Tribes::KeeperOfTheMoon);
    }

    #[test]
    fn rejects_unknown_enum_values() {
        let json = r#"{ "Race": 9, "Gender": 0, "Tribe": 1 }"#;
        assert!(matches!(
            CharacterDescriptor::from_json(json),
            Err(CharaError::Descriptor(_))
        ));
        let json = r#"{ "Race": "Hyur", "Gender": "Other", "Tribe": 1 }"#;
        assert!(CharacterDescriptor::from_json(json).is_err());
    }

    #[test]
    fn maps_to_race() {
        let graph = RaceGraph::builtin().unwrap();
        let chara = CharacterDescriptor::from_json(AURA).unwrap();
        assert_eq!(chara.race(&graph).unwrap(), Race::from_code(1301));

        let json = r#"{ "Race": "Hyur", "Gender": "Feminine", "Tribe": "Highlander" }"#;
        let chara = CharacterDescriptor::from_json(json).unwrap();
        assert_eq!(chara.race(&graph).unwrap(), Race::from_code(401));
    }

    #[test]
    fn foreign_tribe_is_unknown_race() {
        let graph = RaceGraph::builtin().unwrap();
        let json = r#"{ "Race": "Hyur", "Gender": "Masculine", "Tribe": "Wildwood" }"#;
        let chara = CharacterDescriptor::from_json(json).unwrap();
        assert!(matches!(
            chara.race(&graph),
            Err(CharaError::UnknownRace(_))
        ));
    }

    #[test]
    fn tribes_pair_with_races() {
        assert_eq!(Races::Hyur.tribes(), [Tribes::Midlander, Tribes::Highlander]);
        assert_eq!(Races::Viera.tribes(), [Tribes::Rava, Tribes::Veena]);
    }
}
