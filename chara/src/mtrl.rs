use crate::{
    catalog::{CatalogItem, ModelInfo, PrimaryCategory},
    error::CharaError,
    model::Model,
    race::{Race, RaceGraph},
    settings::{ColorConfig, RendererVersion, ResolveSettings, SkinPolicy},
};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt, ops::Range};
use tracing::{debug, warn};

/// Asset family of a material, told apart by the characters at offsets 4 and 9 of its
/// file name (`/mt_c0101b0001_a.mtrl` → `cb`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialFamily {
    Body,
    Face,
    Hair,
    Tail,
    Ear,
    Equipment,
    Accessory,
    Weapon,
    Monster,
    DemiHuman,
}

impl MaterialFamily {
    pub const ALL: [Self; 10] = [
        Self::Body,
        Self::Face,
        Self::Hair,
        Self::Tail,
        Self::Ear,
        Self::Equipment,
        Self::Accessory,
        Self::Weapon,
        Self::Monster,
        Self::DemiHuman,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Self::Body => "cb",
            Self::Face => "cf",
            Self::Hair => "ch",
            Self::Tail => "ct",
            Self::Ear => "cz",
            Self::Equipment => "ce",
            Self::Accessory => "ca",
            Self::Weapon => "wb",
            Self::Monster => "mb",
            Self::DemiHuman => "de",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|family| family.tag() == tag)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Body => "Body",
            Self::Face => "Face",
            Self::Hair => "Hair",
            Self::Tail => "Tail",
            Self::Ear => "Ear",
            Self::Equipment => "Equipment",
            Self::Accessory => "Accessory",
            Self::Weapon => "Weapon",
            Self::Monster => "Monster",
            Self::DemiHuman => "DemiHuman",
        }
    }

    fn decoder(self) -> &'static Regex {
        match self {
            Self::Body => &*BODY,
            Self::Face => &*FACE,
            Self::Hair => &*HAIR,
            Self::Tail => &*TAIL,
            Self::Ear => &*EAR,
            Self::Equipment => &*EQUIPMENT,
            Self::Accessory => &*ACCESSORY,
            Self::Weapon => &*WEAPON,
            Self::Monster => &*MONSTER,
            Self::DemiHuman => &*DEMIHUMAN,
        }
    }
}

impl fmt::Display for MaterialFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

lazy_static! {
    static ref BODY: Regex =
        Regex::new(r"^/mt_c(?P<race>\d{4})b(?P<id>\d{4})[^/]*\.mtrl$").unwrap();
    static ref FACE: Regex =
        Regex::new(r"^/mt_c(?P<race>\d{4})f(?P<id>\d{4})[^/]*\.mtrl$").unwrap();
    static ref HAIR: Regex =
        Regex::new(r"^/mt_c(?P<race>\d{4})h(?P<id>\d{4})[^/]*\.mtrl$").unwrap();
    static ref TAIL: Regex =
        Regex::new(r"^/mt_c(?P<race>\d{4})t(?P<id>\d{4})[^/]*\.mtrl$").unwrap();
    static ref EAR: Regex = Regex::new(r"^/mt_c(?P<race>\d{4})z(?P<id>\d{4})[^/]*\.mtrl$").unwrap();
    static ref EQUIPMENT: Regex =
        Regex::new(r"^/mt_c(?P<race>\d{4})e(?P<id>\d{4})[^/]*\.mtrl$").unwrap();
    static ref ACCESSORY: Regex =
        Regex::new(r"^/mt_c(?P<race>\d{4})a(?P<id>\d{4})[^/]*\.mtrl$").unwrap();
    static ref WEAPON: Regex =
        Regex::new(r"^/mt_w(?P<id>\d{4})b(?P<body>\d{4})[^/]*\.mtrl$").unwrap();
    static ref MONSTER: Regex =
        Regex::new(r"^/mt_m(?P<id>\d{4})b(?P<body>\d{4})[^/]*\.mtrl$").unwrap();
    static ref DEMIHUMAN: Regex =
        Regex::new(r"^/mt_d(?P<id>\d{4})e(?P<body>\d{4})[^/]*\.mtrl$").unwrap();
}

/// Cuts a raw reference down to its `/mt_...` file name.
pub fn normalize(raw: &str) -> Cow<'_, str> {
    let raw = raw.trim();
    match raw.rfind('/') {
        Some(idx) => Cow::Borrowed(&raw[idx..]),
        None => Cow::Owned(format!("/{raw}")),
    }
}

fn capture_id(caps: &Captures<'_>, name: &str) -> Option<(u16, Range<usize>)> {
    let m = caps.name(name)?;
    m.as_str().parse().ok().map(|value| (value, m.range()))
}

/// A decoded material reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialRef {
    pub family: MaterialFamily,
    /// Normalized file name.
    pub file: Box<str>,
    /// Race embedded in character and gear references.
    pub race: Option<Race>,
    /// Id after the family marker: body part id, gear model id or model set id.
    pub id: u16,
    /// Body id of weapon, monster and demihuman references.
    pub body_id: Option<u16>,
    race_span: Option<Range<usize>>,
    id_span: Range<usize>,
}

impl MaterialRef {
    pub fn parse(raw: &str) -> Result<Self, CharaError> {
        let file = normalize(raw);
        let invalid = || CharaError::MaterialPath(raw.into());

        let bytes = file.as_bytes();
        if bytes.len() < 10 {
            return Err(invalid());
        }
        let tag = [bytes[4], bytes[9]];
        let family = std::str::from_utf8(&tag)
            .ok()
            .and_then(MaterialFamily::from_tag)
            .ok_or_else(invalid)?;

        let caps = family.decoder().captures(&file).ok_or_else(invalid)?;
        let race = capture_id(&caps, "race").map(|(code, span)| (Race::from_code(code), span));
        let (id, id_span) = capture_id(&caps, "id").ok_or_else(invalid)?;
        let body_id = capture_id(&caps, "body").map(|(value, _)| value);

        Ok(Self {
            family,
            file: file.as_ref().into(),
            race: race.as_ref().map(|(race, _)| *race),
            id,
            body_id,
            race_span: race.map(|(_, span)| span),
            id_span,
        })
    }

    /// Copy of the file name with the race and/or marker id swapped out.
    fn substitute(&self, race: Option<Race>, id: Option<u16>) -> Box<str> {
        let mut edits: Vec<(Range<usize>, String)> = Vec::with_capacity(2);
        if let (Some(span), Some(race)) = (self.race_span.clone(), race) {
            edits.push((span, race.to_string()));
        }
        if let Some(id) = id {
            edits.push((self.id_span.clone(), format!("{id:04}")));
        }
        edits.sort_by_key(|(span, _)| span.start);

        let mut out = String::with_capacity(self.file.len());
        let mut cursor = 0;
        for (span, text) in edits {
            out.push_str(&self.file[cursor..span.start]);
            out.push_str(&text);
            cursor = span.end;
        }
        out.push_str(&self.file[cursor..]);
        out.into_boxed_str()
    }
}

/// Stand-in item describing whose material is being loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialItem {
    pub category: PrimaryCategory,
    pub name: Box<str>,
    /// Secondary category of the item, e.g. "Body" or "Legs".
    pub slot: Box<str>,
    pub model: ModelInfo,
}

impl MaterialItem {
    fn from_item(item: &CatalogItem) -> Self {
        Self {
            category: item.primary_category(),
            name: item.name.clone(),
            slot: item.category.clone(),
            model: item.model,
        }
    }

    fn character(family: MaterialFamily, race: Race, id: u16) -> Self {
        Self {
            category: PrimaryCategory::Character,
            name: family.name().into(),
            slot: family.name().into(),
            model: ModelInfo {
                primary_id: race.code(),
                secondary_id: id,
                variant_id: 0,
            },
        }
    }
}

/// Identity and key of the material record to load for one reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedMaterialPath {
    pub family: MaterialFamily,
    pub race: Option<Race>,
    pub secondary_id: u16,
    /// File name to request, after any skin substitution.
    pub key: Box<str>,
    pub item: MaterialItem,
}

/// Resolves a decoded reference met on a model of `source`.
///
/// Body materials are redirected to the skin race: the user's settings race when it
/// descends from the material's skin race, otherwise body `0001` of the material's own
/// skin race.
pub fn resolve_path(
    reference: &MaterialRef,
    source: &CatalogItem,
    graph: &RaceGraph,
    skin: &SkinPolicy,
) -> Result<ResolvedMaterialPath, CharaError> {
    let family = reference.family;
    let embedded_race = || {
        reference
            .race
            .ok_or_else(|| CharaError::MaterialPath(reference.file.clone()))
    };

    let resolved = match family {
        MaterialFamily::Body => {
            let item_race = embedded_race()?;
            let item_skin = graph.skin_race(item_race)?;
            let settings = skin.for_gender(item_race.gender());
            let settings_skin = graph.skin_race(settings.race)?;

            let (race, body) = if graph.is_child_of(settings_skin, item_skin) {
                (settings_skin, settings.body_id)
            } else {
                (item_skin, 1)
            };
            debug!(file = %reference.file, %item_skin, %race, body, "body material redirected");

            ResolvedMaterialPath {
                family,
                race: Some(race),
                secondary_id: body,
                key: reference.substitute(Some(race), Some(body)),
                item: MaterialItem::character(family, race, body),
            }
        }
        MaterialFamily::Face
        | MaterialFamily::Hair
        | MaterialFamily::Tail
        | MaterialFamily::Ear => {
            let race = embedded_race()?;
            ResolvedMaterialPath {
                family,
                race: Some(race),
                secondary_id: reference.id,
                key: reference.file.clone(),
                item: MaterialItem::character(family, race, reference.id),
            }
        }
        MaterialFamily::Equipment | MaterialFamily::Accessory => {
            let mut item = MaterialItem::from_item(source);
            item.model.primary_id = reference.id;
            ResolvedMaterialPath {
                family,
                race: reference.race,
                secondary_id: item.model.secondary_id,
                key: reference.file.clone(),
                item,
            }
        }
        MaterialFamily::Weapon | MaterialFamily::Monster | MaterialFamily::DemiHuman => {
            let mut item = MaterialItem::from_item(source);
            item.model.primary_id = reference.id;
            item.model.secondary_id = reference.body_id.unwrap_or(item.model.secondary_id);
            ResolvedMaterialPath {
                family,
                race: None,
                secondary_id: item.model.secondary_id,
                key: reference.file.clone(),
                item,
            }
        }
    };
    Ok(resolved)
}

/// Reads material records.
#[async_trait]
pub trait MaterialSource: Sync {
    type Material: Send + Sync;

    /// `Ok(None)` when no material exists under `key`.
    async fn load_material(
        &self,
        item: &MaterialItem,
        key: &str,
        renderer: RendererVersion,
    ) -> Result<Option<Self::Material>, CharaError>;
}

/// Bakes the texture maps a renderer needs for one material.
#[async_trait]
pub trait TextureBaker<M: Sync>: Sync {
    type Maps: Send;

    async fn bake(&self, material: &M, colors: &ColorConfig) -> Result<Self::Maps, CharaError>;
}

/// Baked maps per model material index, in the order the model lists its materials.
#[derive(Debug)]
pub struct MeshMaterials<Maps> {
    pub maps: Vec<(usize, Maps)>,
    /// Materials left out, with the reason.
    pub skipped: Vec<(usize, CharaError)>,
}

impl<Maps> MeshMaterials<Maps> {
    pub fn get(&self, slot: usize) -> Option<&Maps> {
        self.maps
            .iter()
            .find(|(idx, _)| *idx == slot)
            .map(|(_, maps)| maps)
    }
}

impl<Maps> Default for MeshMaterials<Maps> {
    fn default() -> Self {
        Self {
            maps: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// Loads every material `model` references, then bakes maps for those that loaded.
///
/// Materials are independent: any failure only drops the material concerned.
pub async fn resolve_materials<M, B>(
    model: &Model,
    source: &CatalogItem,
    graph: &RaceGraph,
    settings: &ResolveSettings,
    materials: &M,
    baker: &B,
) -> MeshMaterials<B::Maps>
where
    M: MaterialSource + ?Sized,
    B: TextureBaker<M::Material> + ?Sized,
{
    let mut result = MeshMaterials::default();
    let mut loaded = Vec::with_capacity(model.materials.len());

    for (slot, raw) in model.materials.iter().enumerate() {
        let path = match MaterialRef::parse(raw)
            .and_then(|reference| resolve_path(&reference, source, graph, &settings.skin))
        {
            Ok(path) => path,
            Err(e) => {
                warn!(material = %raw, error = %e, "skipping material");
                result.skipped.push((slot, e));
                continue;
            }
        };

        let material = materials
            .load_material(&path.item, &path.key, settings.renderer)
            .await;
        match material {
            Ok(Some(material)) => loaded.push((slot, material)),
            Ok(None) => {
                warn!(material = %path.key, "material not found");
                result
                    .skipped
                    .push((slot, CharaError::MaterialUnavailable(path.key)));
            }
            Err(e) => {
                warn!(material = %path.key, error = %e, "failed to load material");
                result.skipped.push((slot, e));
            }
        }
    }

    for (slot, material) in loaded {
        match baker.bake(&material, &settings.colors).await {
            Ok(maps) => result.maps.push((slot, maps)),
            Err(e) => {
                warn!(slot, error = %e, "failed to bake texture maps");
                result.skipped.push((slot, e));
            }
        }
    }

    result
}
