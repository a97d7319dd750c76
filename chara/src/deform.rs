use crate::{
    error::CharaError,
    model::Model,
    race::{Race, RaceGraph},
};
use glam::Vec3;
use nohash_hasher::IntMap;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, io::Read, iter};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Parent proportions to this race's proportions.
    Forward,
    /// This race's proportions back to its parent's.
    Inverse,
}

/// One per-edge deformation: `race`'s own deform, applied in `direction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeformStep {
    pub race: Race,
    pub direction: Direction,
}

impl DeformStep {
    pub fn forward(race: Race) -> Self {
        Self {
            race,
            direction: Direction::Forward,
        }
    }

    pub fn inverse(race: Race) -> Self {
        Self {
            race,
            direction: Direction::Inverse,
        }
    }
}

/// Plans the deforms that turn a model authored for `current` into one for `target`.
///
/// Walks up from `current` undoing each race's deform until reaching an ancestor shared
/// with `target`, then applies forward deforms down to `target`. Races living in different
/// trees meet at their roots, which count as interchangeable bases. The plan never has more
/// than `depth(current) + depth(target)` steps.
pub fn deform_chain(
    graph: &RaceGraph,
    current: Race,
    target: Race,
) -> Result<Vec<DeformStep>, CharaError> {
    graph.node(current)?;
    graph.node(target)?;
    if current == target {
        return Ok(Vec::new());
    }

    let up: Vec<Race> = iter::once(current).chain(graph.ancestors(current)).collect();
    let down: Vec<Race> = iter::once(target).chain(graph.ancestors(target)).collect();

    let (up_len, down_len) = up
        .iter()
        .enumerate()
        .find_map(|(i, race)| down.iter().position(|other| other == race).map(|j| (i, j)))
        .unwrap_or((up.len() - 1, down.len() - 1));

    let steps: Vec<DeformStep> = up[..up_len]
        .iter()
        .map(|race| DeformStep::inverse(*race))
        .chain(down[..down_len].iter().rev().map(|race| DeformStep::forward(*race)))
        .collect();

    trace!(%current, %target, steps = steps.len(), "deform chain planned");
    Ok(steps)
}

/// Displaces model vertices from one race's proportions to another's.
pub trait Deformer: Sync {
    fn deform(&self, model: &mut Model, race: Race, direction: Direction)
        -> Result<(), CharaError>;
}

pub fn apply_chain(
    deformer: &dyn Deformer,
    model: &mut Model,
    steps: &[DeformStep],
) -> Result<(), CharaError> {
    for step in steps {
        deformer.deform(model, step.race, step.direction)?;
    }
    Ok(())
}

/// Per-race bone translations, blended by vertex bone weights.
///
/// A race's entry holds the offset each bone moves by when going from the parent race to
/// that race. Bones absent from an entry do not move.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoneOffsetDeformer {
    races: IntMap<Race, HashMap<Box<str>, Vec3>>,
}

impl BoneOffsetDeformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, CharaError> {
        serde_json::from_reader(reader)
            .map_err(|e| CharaError::Deform(e.to_string().into_boxed_str()))
    }

    pub fn insert(&mut self, race: Race, bone: &str, offset: Vec3) {
        self.races.entry(race).or_default().insert(bone.into(), offset);
    }

    pub fn contains(&self, race: Race) -> bool {
        self.races.contains_key(&race)
    }
}

impl Deformer for BoneOffsetDeformer {
    fn deform(
        &self,
        model: &mut Model,
        race: Race,
        direction: Direction,
    ) -> Result<(), CharaError> {
        let offsets = self.races.get(&race).ok_or_else(|| {
            CharaError::Deform(format!("no deformation data for race {race}").into_boxed_str())
        })?;
        let sign = match direction {
            Direction::Forward => 1.0,
            Direction::Inverse => -1.0,
        };

        let per_bone: Vec<Vec3> = model
            .bones
            .iter()
            .map(|bone| offsets.get(bone).copied().unwrap_or(Vec3::ZERO))
            .collect();

        for mesh in model.meshes.iter_mut() {
            for vertex in mesh.vertices.iter_mut() {
                let delta: Vec3 = vertex
                    .influences()
                    .filter_map(|(bone, weight)| per_bone.get(bone).map(|v| *v * weight))
                    .sum();
                vertex.position += delta * sign;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Mesh, Vertex};
    use crate::race::{RaceEntry, RaceTable};

    fn race(code: &str) -> Race {
        code.parse().unwrap()
    }

    #[test]
    fn same_race_needs_nothing() {
        let graph = RaceGraph::builtin().unwrap();
        assert!(deform_chain(&graph, race("0101"), race("0101"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn parent_to_child() {
        let graph = RaceGraph::builtin().unwrap();
        assert_eq!(
            deform_chain(&graph, race("0901"), race("1501")).unwrap(),
            vec![DeformStep::forward(race("1501"))]
        );
    }

    #[test]
    fn child_to_parent() {
        let graph = RaceGraph::builtin().unwrap();
        assert_eq!(
            deform_chain(&graph, race("1501"), race("0901")).unwrap(),
            vec![DeformStep::inverse(race("1501"))]
        );
    }

    #[test]
    fn through_common_ancestor() {
        let graph = RaceGraph::builtin().unwrap();
        assert_eq!(
            deform_chain(&graph, race("0901"), race("1301")).unwrap(),
            vec![
                DeformStep::inverse(race("0901")),
                DeformStep::inverse(race("0301")),
                DeformStep::forward(race("0501")),
                DeformStep::forward(race("1301")),
            ]
        );
        assert_eq!(
            deform_chain(&graph, race("0101"), race("1501")).unwrap(),
            vec![
                DeformStep::forward(race("0301")),
                DeformStep::forward(race("0901")),
                DeformStep::forward(race("1501")),
            ]
        );
    }

    #[test]
    fn chains_are_bounded_by_depth() {
        let graph = RaceGraph::builtin().unwrap();
        for from in graph.nodes() {
            for to in graph.nodes() {
                let steps = deform_chain(&graph, from.race, to.race).unwrap();
                let bound = graph.depth(from.race).unwrap() + graph.depth(to.race).unwrap();
                assert!(steps.len() <= bound, "{} -> {}", from.race, to.race);
            }
        }
    }

    #[test]
    fn disjoint_trees_meet_at_roots() {
        let entry = |code: &str, parent: Option<&str>| RaceEntry {
            name: code.into(),
            code: race(code),
            parent: parent.map(race),
            skin: race(code),
            fallback: None,
        };
        let graph = RaceGraph::from_table(RaceTable {
            version: 1,
            races: vec![
                entry("0101", None),
                entry("0301", Some("0101")),
                entry("0201", None),
                entry("0401", Some("0201")),
                entry("1001", Some("0401")),
            ],
        })
        .unwrap();

        assert_eq!(
            deform_chain(&graph, race("0301"), race("1001")).unwrap(),
            vec![
                DeformStep::inverse(race("0301")),
                DeformStep::forward(race("0401")),
                DeformStep::forward(race("1001")),
            ]
        );
    }

    #[test]
    fn unknown_race_fails() {
        let graph = RaceGraph::builtin().unwrap();
        assert!(matches!(
            deform_chain(&graph, race("0101"), race("4242")),
            Err(CharaError::UnknownRace(_))
        ));
    }

    fn model() -> Model {
        let vertex = |x: f32, bones: [u8; 4], weights: [f32; 4]| Vertex {
            position: Vec3::new(x, 1.0, -x),
            bones,
            weights,
        };
        Model {
            bones: vec!["j_kosi".into(), "j_sebo_a".into(), "j_kao".into()],
            materials: vec!["/mt_c0101e0001_top_a.mtrl".into()],
            meshes: vec![Mesh {
                material: 0,
                vertices: vec![
                    vertex(0.5, [0, 1, 0, 0], [0.25, 0.75, 0.0, 0.0]),
                    vertex(-1.5, [2, 0, 0, 0], [1.0, 0.0, 0.0, 0.0]),
                    vertex(3.0, [1, 2, 0, 0], [0.5, 0.5, 0.0, 0.0]),
                ],
                indices: vec![0, 1, 2],
            }],
        }
    }

    fn deformer() -> BoneOffsetDeformer {
        let mut deformer = BoneOffsetDeformer::new();
        deformer.insert(race("0301"), "j_kosi", Vec3::new(0.0, 0.1, 0.0));
        deformer.insert(race("0301"), "j_sebo_a", Vec3::new(0.05, 0.2, 0.01));
        deformer.insert(race("0301"), "j_kao", Vec3::new(0.0, 0.3, -0.02));
        deformer
    }

    #[test]
    fn forward_moves_weighted() {
        let mut model = model();
        deformer()
            .deform(&mut model, race("0301"), Direction::Forward)
            .unwrap();
        let moved = model.meshes[0].vertices[0].position;
        let expected = Vec3::new(0.5, 1.0, -0.5)
            + Vec3::new(0.0, 0.1, 0.0) * 0.25
            + Vec3::new(0.05, 0.2, 0.01) * 0.75;
        assert!(moved.abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn forward_then_inverse_round_trips() {
        let original = model();
        let mut model = original.clone();
        let deformer = deformer();
        deformer
            .deform(&mut model, race("0301"), Direction::Forward)
            .unwrap();
        assert_ne!(model, original);
        deformer
            .deform(&mut model, race("0301"), Direction::Inverse)
            .unwrap();

        for (a, b) in original.meshes[0]
            .vertices
            .iter()
            .zip(model.meshes[0].vertices.iter())
        {
            assert!(a.position.abs_diff_eq(b.position, 1e-5));
        }
    }

    #[test]
    fn missing_race_data_fails() {
        let mut model = model();
        assert!(matches!(
            deformer().deform(&mut model, race("1501"), Direction::Forward),
            Err(CharaError::Deform(_))
        ));
    }

    #[test]
    fn loads_from_json() {
        let json = r#"{ "races": { "0301": { "j_kao": [0.0, 0.3, 0.0] } } }"#;
        let deformer = BoneOffsetDeformer::from_reader(json.as_bytes()).unwrap();
        assert!(deformer.contains(race("0301")));
        assert!(!deformer.contains(race("0101")));
    }

    #[test]
    fn applies_whole_chain() {
        let graph = RaceGraph::builtin().unwrap();
        let mut deformer = deformer();
        deformer.insert(race("0901"), "j_kosi", Vec3::new(0.0, 0.2, 0.0));
        let original = model();
        let mut model = original.clone();

        let there = deform_chain(&graph, race("0101"), race("0901")).unwrap();
        apply_chain(&deformer, &mut model, &there).unwrap();
        let back = deform_chain(&graph, race("0901"), race("0101")).unwrap();
        apply_chain(&deformer, &mut model, &back).unwrap();

        for (a, b) in original.meshes[0]
            .vertices
            .iter()
            .zip(model.meshes[0].vertices.iter())
        {
            assert!(a.position.abs_diff_eq(b.position, 1e-5));
        }
    }
}
