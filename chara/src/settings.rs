use crate::{
    descriptor::Gender,
    error::CharaError,
    race::{Race, RaceGraph},
};
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Race and body whose skin the user wants to see on skin-showing gear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SettingsRace {
    pub race: Race,
    pub body_id: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkinPolicy {
    pub masculine: SettingsRace,
    pub feminine: SettingsRace,
}

impl SkinPolicy {
    pub fn for_gender(&self, gender: Gender) -> SettingsRace {
        match gender {
            Gender::Masculine => self.masculine,
            Gender::Feminine => self.feminine,
        }
    }
}

impl Default for SkinPolicy {
    fn default() -> Self {
        Self {
            masculine: SettingsRace {
                race: Race::from_code(101),
                body_id: 1,
            },
            feminine: SettingsRace {
                race: Race::from_code(201),
                body_id: 1,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RendererVersion {
    Dx9,
    #[default]
    Dx11,
}

/// Custom colours used when baking skin, hair and eye maps. RGBA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    pub skin: [u8; 4],
    pub hair: [u8; 4],
    pub hair_highlight: [u8; 4],
    pub iris: [u8; 4],
    pub lips: [u8; 4],
    pub tattoo: [u8; 4],
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            skin: [204, 149, 120, 255],
            hair: [130, 64, 13, 255],
            hair_highlight: [77, 126, 240, 255],
            iris: [45, 112, 173, 255],
            lips: [173, 105, 105, 255],
            tattoo: [0, 255, 66, 255],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveSettings {
    pub skin: SkinPolicy,
    pub renderer: RendererVersion,
    pub colors: ColorConfig,
}

impl ResolveSettings {
    pub fn from_reader(reader: impl Read) -> Result<Self, CharaError> {
        serde_json::from_reader(reader).map_err(CharaError::Settings)
    }

    /// Fails with [`CharaError::UnknownRace`] if a skin policy race is missing from `graph`.
    pub fn check_races(&self, graph: &RaceGraph) -> Result<(), CharaError> {
        graph.node(self.skin.masculine.race)?;
        graph.node(self.skin.feminine.race)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_settings_use_defaults() {
        let json = r#"{ "skin": { "feminine": { "race": "1401", "body_id": 1 } } }"#;
        let settings = ResolveSettings::from_reader(json.as_bytes()).unwrap();
        assert_eq!(settings.skin.feminine.race, Race::from_code(1401));
        assert_eq!(settings.skin.masculine.race, Race::from_code(101));
        assert_eq!(settings.renderer, RendererVersion::Dx11);
        assert_eq!(settings.colors, ColorConfig::default());
    }

    #[test]
    fn settings_races_must_be_in_graph() {
        let graph = RaceGraph::builtin().unwrap();
        assert!(ResolveSettings::default().check_races(&graph).is_ok());

        let json = r#"{ "skin": { "masculine": { "race": "9901", "body_id": 1 } } }"#;
        let settings = ResolveSettings::from_reader(json.as_bytes()).unwrap();
        assert!(matches!(
            settings.check_races(&graph),
            Err(CharaError::UnknownRace(_))
        ));
    }

    #[test]
    fn picks_by_gender() {
        let policy = SkinPolicy::default();
        assert_eq!(
            policy.for_gender(Gender::Feminine).race,
            Race::from_code(201)
        );
    }
}
