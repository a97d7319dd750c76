use crate::{
    catalog::{CatalogItem, ItemCatalog},
    deform::{apply_chain, deform_chain, DeformStep, Deformer},
    descriptor::CharacterDescriptor,
    error::CharaError,
    model::{Model, ModelSource},
    mtrl::{resolve_materials, MaterialSource, MeshMaterials, TextureBaker},
    race::{Race, RaceGraph},
    settings::ResolveSettings,
    slot::{SlotName, SlotResolver},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, info, warn};

/// Receives human-readable progress messages. Must not block.
pub trait Progress: Sync {
    fn report(&self, message: &str);
}

impl<F> Progress for F
where
    F: Fn(&str) + Sync,
{
    fn report(&self, message: &str) {
        self(message)
    }
}

pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&self, _message: &str) {}
}

/// Cooperative cancellation flag, checked between slots.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A model brought into the proportions of the race it was requested for.
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub model: Model,
    /// Race the model data was authored for.
    pub native_race: Race,
    pub target_race: Race,
    /// Deforms applied to go from the native to the target race.
    pub deforms: Vec<DeformStep>,
}

/// Fetches models, falling back across the race graph and deforming the result.
pub struct ModelResolver<'a, S: ?Sized> {
    graph: &'a RaceGraph,
    source: &'a S,
    deformer: &'a dyn Deformer,
}

impl<'a, S> ModelResolver<'a, S>
where
    S: ModelSource + ?Sized,
{
    pub fn new(graph: &'a RaceGraph, source: &'a S, deformer: &'a dyn Deformer) -> Self {
        Self {
            graph,
            source,
            deformer,
        }
    }

    /// Loads `item` for `target`, or for the first race of its priority list that has it.
    pub async fn load(
        &self,
        item: &CatalogItem,
        target: Race,
    ) -> Result<(Model, Race), CharaError> {
        if let Some(model) = self.source.load_model(item, target).await? {
            return Ok((model, target));
        }

        for candidate in self.graph.model_priority_list(target)? {
            debug!(item = %item.name, %target, %candidate, "trying fallback race");
            if let Some(model) = self.source.load_model(item, candidate).await? {
                return Ok((model, candidate));
            }
        }

        Err(CharaError::ModelUnavailable(
            format!("{} at {target}", item.name).into_boxed_str(),
        ))
    }

    pub async fn resolve(
        &self,
        item: &CatalogItem,
        target: Race,
    ) -> Result<ResolvedModel, CharaError> {
        let (mut model, native_race) = self.load(item, target).await?;

        let deforms = deform_chain(self.graph, native_race, target)?;
        if !deforms.is_empty() {
            debug!(
                item = %item.name,
                %native_race,
                %target,
                steps = deforms.len(),
                "deforming model"
            );
            apply_chain(self.deformer, &mut model, &deforms)?;
        }

        Ok(ResolvedModel {
            model,
            native_race,
            target_race: target,
            deforms,
        })
    }
}

#[derive(Debug)]
pub struct ResolvedSlot<Maps> {
    pub slot: SlotName,
    pub item: CatalogItem,
    pub model: ResolvedModel,
    pub materials: MeshMaterials<Maps>,
}

#[derive(Debug)]
pub enum SlotOutcome<Maps> {
    Resolved(Box<ResolvedSlot<Maps>>),
    /// Nothing occupies the slot.
    Empty,
    /// The slot failed; sibling slots were still resolved.
    Failed(CharaError),
}

#[derive(Debug)]
pub struct CharacterAssets<Maps> {
    pub race: Race,
    pub slots: Vec<(SlotName, SlotOutcome<Maps>)>,
    /// Resolution stopped early; `slots` holds what finished before.
    pub cancelled: bool,
}

impl<Maps> CharacterAssets<Maps> {
    pub fn resolved(&self) -> impl Iterator<Item = &ResolvedSlot<Maps>> + '_ {
        self.slots.iter().filter_map(|(_, outcome)| match outcome {
            SlotOutcome::Resolved(slot) => Some(slot.as_ref()),
            _ => None,
        })
    }

    pub fn get(&self, slot: SlotName) -> Option<&SlotOutcome<Maps>> {
        self.slots
            .iter()
            .find(|(name, _)| *name == slot)
            .map(|(_, outcome)| outcome)
    }
}

/// Resolves a whole character descriptor, one slot at a time.
pub struct CharacterResolver<'a, S: ?Sized, M: ?Sized, B: ?Sized> {
    graph: &'a RaceGraph,
    catalog: &'a ItemCatalog,
    models: ModelResolver<'a, S>,
    materials: &'a M,
    baker: &'a B,
    settings: ResolveSettings,
    progress: &'a dyn Progress,
    cancel: CancelToken,
}

impl<'a, S, M, B> CharacterResolver<'a, S, M, B>
where
    S: ModelSource + ?Sized,
    M: MaterialSource + ?Sized,
    B: TextureBaker<M::Material> + ?Sized,
{
    pub fn new(
        graph: &'a RaceGraph,
        catalog: &'a ItemCatalog,
        models: &'a S,
        deformer: &'a dyn Deformer,
        materials: &'a M,
        baker: &'a B,
    ) -> Self {
        Self {
            graph,
            catalog,
            models: ModelResolver::new(graph, models, deformer),
            materials,
            baker,
            settings: ResolveSettings::default(),
            progress: &NoProgress,
            cancel: CancelToken::default(),
        }
    }

    pub fn with_settings(mut self, settings: ResolveSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Resolves every slot of `descriptor`.
    ///
    /// Fails outright on an unmapped race or when a mandatory slot fails. Other slot
    /// failures are recorded in the result and resolution carries on.
    pub async fn resolve(
        &self,
        descriptor: &CharacterDescriptor,
    ) -> Result<CharacterAssets<B::Maps>, CharaError> {
        let race = descriptor.race(self.graph)?;
        info!(%race, name = self.graph.name(race), "resolving character");

        let resolver = SlotResolver::new(self.catalog, race);
        let mut assets = CharacterAssets {
            race,
            slots: Vec::with_capacity(SlotName::ALL.len()),
            cancelled: false,
        };

        for slot in SlotName::ALL {
            if self.cancel.is_cancelled() {
                info!(%slot, "resolution cancelled");
                assets.cancelled = true;
                break;
            }

            let outcome = match self.resolve_slot(&resolver, descriptor, slot).await {
                Ok(Some(resolved)) => SlotOutcome::Resolved(Box::new(resolved)),
                Ok(None) => SlotOutcome::Empty,
                Err(e) if slot.is_mandatory() => return Err(e),
                Err(e) => {
                    warn!(%slot, error = %e, "skipping slot");
                    self.progress.report(&format!("Skipping {slot}: {e}"));
                    SlotOutcome::Failed(e)
                }
            };
            assets.slots.push((slot, outcome));
        }

        Ok(assets)
    }

    async fn resolve_slot(
        &self,
        resolver: &SlotResolver<'a>,
        descriptor: &CharacterDescriptor,
        slot: SlotName,
    ) -> Result<Option<ResolvedSlot<B::Maps>>, CharaError> {
        let Some(item) = resolver.resolve(descriptor, slot)? else {
            return Ok(None);
        };

        self.progress.report(&format!("Resolving {slot}: {}", item.name));
        let model = self.models.resolve(&item, resolver.race()).await?;
        let materials = resolve_materials(
            &model.model,
            &item,
            self.graph,
            &self.settings,
            self.materials,
            self.baker,
        )
        .await;

        info!(
            %slot,
            item = %item.name,
            native = %model.native_race,
            vertices = model.model.vertex_count(),
            materials = materials.maps.len(),
            skipped = materials.skipped.len(),
            "slot resolved"
        );
        Ok(Some(ResolvedSlot {
            slot,
            item: item.into_owned(),
            model,
            materials,
        }))
    }
}
