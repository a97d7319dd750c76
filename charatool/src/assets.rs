use async_trait::async_trait;
use chara::{
    catalog::CatalogItem,
    error::CharaError,
    model::{Model, ModelSource},
    mtrl::{MaterialItem, MaterialSource, TextureBaker},
    paths::model_path,
    race::Race,
    settings::{ColorConfig, RendererVersion},
};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, trace};

fn source_error(e: impl std::error::Error + Send + Sync + 'static) -> CharaError {
    CharaError::Source(Box::new(e))
}

/// Reads a file, treating absence as `None`.
fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, CharaError> {
    match fs::read(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CharaError::IO(e)),
    }
}

/// Directory of assets extracted from the game, laid out by in-game path.
#[derive(Debug, Clone)]
pub struct AssetDir {
    root: PathBuf,
}

impl AssetDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// File for an in-game path, with `extension` appended to its name.
    fn file(&self, game_path: &str, extension: &str) -> PathBuf {
        self.root
            .join(format!("{}.{extension}", game_path.trim_start_matches('/')))
    }

    pub fn deform_table(&self) -> PathBuf {
        self.root.join("deform.json")
    }
}

#[async_trait]
impl ModelSource for AssetDir {
    async fn load_model(
        &self,
        item: &CatalogItem,
        race: Race,
    ) -> Result<Option<Model>, CharaError> {
        let path = self.file(&model_path(item, race)?, "json");
        trace!(path = %path.to_string_lossy(), "looking up model");

        match read_optional(&path)? {
            Some(raw) => serde_json::from_slice(&raw).map(Some).map_err(source_error),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureUsage {
    Diffuse,
    Normal,
    Specular,
    Multi,
}

impl TextureUsage {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Diffuse => "d",
            Self::Normal => "n",
            Self::Specular => "s",
            Self::Multi => "m",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextureRef {
    pub usage: TextureUsage,
    /// In-game texture path.
    pub path: Box<str>,
}

/// Material as extracted to `material/<key>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialRecord {
    #[serde(default)]
    pub path: Box<str>,
    pub shader: Box<str>,
    #[serde(default)]
    pub textures: Vec<TextureRef>,
}

#[async_trait]
impl MaterialSource for AssetDir {
    type Material = MaterialRecord;

    async fn load_material(
        &self,
        item: &MaterialItem,
        key: &str,
        renderer: RendererVersion,
    ) -> Result<Option<MaterialRecord>, CharaError> {
        let path = self.file(&format!("material/{}", key.trim_start_matches('/')), "json");
        debug!(material = key, item = %item.name, ?renderer, "loading material");

        let Some(raw) = read_optional(&path)? else {
            return Ok(None);
        };
        let mut record: MaterialRecord = serde_json::from_slice(&raw).map_err(source_error)?;
        if record.path.is_empty() {
            record.path = key.into();
        }
        Ok(Some(record))
    }
}

/// Texture maps of one material, by usage.
#[derive(Debug, Default)]
pub struct BakedMaps {
    pub maps: Vec<(TextureUsage, RgbaImage)>,
}

fn tint(image: &mut RgbaImage, color: [u8; 4]) {
    for Rgba(pixel) in image.pixels_mut() {
        for (channel, factor) in pixel.iter_mut().take(3).zip(color) {
            *channel = ((*channel as u16 * factor as u16) / 255) as u8;
        }
    }
}

#[async_trait]
impl TextureBaker<MaterialRecord> for AssetDir {
    type Maps = BakedMaps;

    async fn bake(
        &self,
        material: &MaterialRecord,
        colors: &ColorConfig,
    ) -> Result<BakedMaps, CharaError> {
        let tint_color = match &*material.shader {
            "skin.shpk" => Some(colors.skin),
            "hair.shpk" => Some(colors.hair),
            _ => None,
        };

        let mut baked = BakedMaps::default();
        for texture in &material.textures {
            let path = self.file(&texture.path, "png");
            let mut image = image::open(&path).map_err(source_error)?.to_rgba8();
            if let (TextureUsage::Diffuse, Some(color)) = (texture.usage, tint_color) {
                tint(&mut image, color);
            }
            baked.maps.push((texture.usage, image));
        }
        Ok(baked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chara::catalog::{ItemKind, ModelInfo};
    use futures::executor::block_on;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("charatool-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn missing_model_is_none() {
        let assets = AssetDir::new(scratch("models"));
        let item = CatalogItem {
            name: "Coat".into(),
            kind: ItemKind::Gear,
            category: "Body".into(),
            model: ModelInfo {
                primary_id: 6077,
                secondary_id: 0,
                variant_id: 1,
            },
        };
        assert!(block_on(assets.load_model(&item, Race::from_code(101)))
            .unwrap()
            .is_none());
    }

    #[test]
    fn loads_material_and_tints_skin() {
        let root = scratch("materials");
        fs::create_dir_all(root.join("material")).unwrap();
        fs::write(
            root.join("material/mt_c0101b0001_a.mtrl.json"),
            r#"{ "shader": "skin.shpk", "textures": [ { "usage": "diffuse", "path": "tex/skin_d.tex" } ] }"#,
        )
        .unwrap();
        fs::create_dir_all(root.join("tex")).unwrap();
        RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 255]))
            .save(root.join("tex/skin_d.tex.png"))
            .unwrap();

        let assets = AssetDir::new(root);
        let item = MaterialItem {
            category: chara::catalog::PrimaryCategory::Character,
            name: "Body".into(),
            slot: "Body".into(),
            model: ModelInfo {
                primary_id: 101,
                secondary_id: 1,
                variant_id: 0,
            },
        };
        let record = block_on(assets.load_material(
            &item,
            "/mt_c0101b0001_a.mtrl",
            RendererVersion::Dx11,
        ))
        .unwrap()
        .unwrap();
        assert_eq!(&*record.path, "/mt_c0101b0001_a.mtrl");

        let colors = ColorConfig::default();
        let baked = block_on(assets.bake(&record, &colors)).unwrap();
        assert_eq!(baked.maps.len(), 1);
        let (usage, image) = &baked.maps[0];
        assert_eq!(*usage, TextureUsage::Diffuse);
        assert_eq!(image.get_pixel(0, 0).0, [204, 149, 120, 255]);

        let missing = block_on(assets.load_material(
            &item,
            "/mt_c0101b0002_a.mtrl",
            RendererVersion::Dx11,
        ))
        .unwrap();
        assert!(missing.is_none());
    }
}
