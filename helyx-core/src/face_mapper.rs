//! Face correspondence between the meshes before and after a topology change.

use crate::fatal_error;
use crate::field::FieldValue;
use std::cell::OnceCell;
use std::collections::HashSet;

/// New object `index` created from the old `master_objects`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMap {
    index: usize,
    master_objects: Vec<usize>,
}

impl ObjectMap {
    pub fn new(index: usize, master_objects: Vec<usize>) -> Self {
        Self {
            index,
            master_objects,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn master_objects(&self) -> &[usize] {
        &self.master_objects
    }
}

/// Face part of a topology change description.
///
/// `face_map[f]` is the old face new face `f` is a copy of, `None` for
/// faces that did not exist before.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopoChangeMap {
    pub n_old_faces: usize,
    pub face_map: Vec<Option<usize>>,
    pub faces_from_points_map: Vec<ObjectMap>,
    pub faces_from_edges_map: Vec<ObjectMap>,
    pub faces_from_faces_map: Vec<ObjectMap>,
    pub reverse_face_map: Vec<Option<usize>>,
    pub flip_face_flux: HashSet<usize>,
}

impl TopoChangeMap {
    pub fn n_faces(&self) -> usize {
        self.face_map.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingKind {
    Direct,
    Interpolative,
}

#[derive(Debug)]
enum Addressing {
    Direct(Vec<usize>),
    Interpolative {
        addressing: Vec<Vec<usize>>,
        weights: Vec<Vec<f64>>,
    },
}

#[derive(Debug)]
struct Computed {
    addressing: Addressing,
    inserted: Vec<usize>,
}

/// Maps face data across a [`TopoChangeMap`]. The addressing is computed
/// on first use and kept until [`FaceMapper::clear_out`].
#[derive(Debug)]
pub struct FaceMapper<'a> {
    map: &'a TopoChangeMap,
    direct: bool,
    computed: OnceCell<Computed>,
}

impl<'a> FaceMapper<'a> {
    pub fn new(map: &'a TopoChangeMap) -> Self {
        let direct = map.faces_from_points_map.is_empty()
            && map.faces_from_edges_map.is_empty()
            && map.faces_from_faces_map.is_empty();
        Self {
            map,
            direct,
            computed: OnceCell::new(),
        }
    }

    /// True when every new face is a plain copy (or an insertion).
    pub fn direct(&self) -> bool {
        self.direct
    }

    pub fn addressing_kind(&self) -> AddressingKind {
        if self.direct {
            AddressingKind::Direct
        } else {
            AddressingKind::Interpolative
        }
    }

    pub fn size(&self) -> usize {
        self.map.n_faces()
    }

    pub fn size_before_mapping(&self) -> usize {
        self.map.n_old_faces
    }

    pub fn reverse_face_map(&self) -> &[Option<usize>] {
        &self.map.reverse_face_map
    }

    pub fn flip_face_flux(&self) -> &HashSet<usize> {
        &self.map.flip_face_flux
    }

    /// Computes the addressing. Calling it twice without a `clear_out` in
    /// between is a usage error.
    pub fn calc_addressing(&self) {
        if self.computed.get().is_some() {
            fatal_error!("FaceMapper::calc_addressing", "faceMapper", "Addressing already calculated.");
        }
        self.check_masters();
        let computed = if self.direct {
            self.calc_direct()
        } else {
            self.calc_interpolative()
        };
        log::debug!(
            "faceMapper: {} faces, {:?} addressing, {} inserted",
            self.size(),
            self.addressing_kind(),
            computed.inserted.len()
        );
        // Cannot fail: emptiness was checked above and the cell is not shared.
        let _ = self.computed.set(computed);
    }

    fn check_masters(&self) {
        let n_old = self.map.n_old_faces;
        let from_face_map = self.map.face_map.iter().flatten();
        let from_objects = self
            .map
            .faces_from_points_map
            .iter()
            .chain(&self.map.faces_from_edges_map)
            .chain(&self.map.faces_from_faces_map)
            .flat_map(|object_map| object_map.master_objects());
        if let Some(master) = from_face_map.chain(from_objects).find(|&&m| m >= n_old) {
            fatal_error!(
                "FaceMapper::calc_addressing",
                "faceMapper",
                "Old face {} is outside 0..{}",
                master,
                n_old
            );
        }
    }

    fn calc_direct(&self) -> Computed {
        let mut inserted = Vec::new();
        let addressing = self
            .map
            .face_map
            .iter()
            .enumerate()
            .map(|(face, master)| match master {
                Some(master) => *master,
                None => {
                    inserted.push(face);
                    0
                }
            })
            .collect();
        Computed {
            addressing: Addressing::Direct(addressing),
            inserted,
        }
    }

    fn calc_interpolative(&self) -> Computed {
        let n_faces = self.size();
        let mut addressing: Vec<Vec<usize>> = vec![Vec::new(); n_faces];
        let mut weights: Vec<Vec<f64>> = vec![Vec::new(); n_faces];

        let sources = [
            ("point", &self.map.faces_from_points_map),
            ("edge", &self.map.faces_from_edges_map),
            ("face", &self.map.faces_from_faces_map),
        ];
        for (kind, object_maps) in sources {
            for object_map in object_maps {
                let face = object_map.index();
                let masters = object_map.master_objects();
                if face >= n_faces {
                    fatal_error!(
                        "FaceMapper::calc_addressing",
                        "faceMapper",
                        "Master face {} mapped from {} objects is outside 0..{}",
                        face,
                        kind,
                        n_faces
                    );
                }
                if !addressing[face].is_empty() {
                    fatal_error!(
                        "FaceMapper::calc_addressing",
                        "faceMapper",
                        "Master face {} mapped from {} faces {:?} already destination of mapping.",
                        face,
                        kind,
                        masters
                    );
                }
                addressing[face] = masters.to_vec();
                weights[face] = vec![1.0 / masters.len() as f64; masters.len()];
            }
        }

        for (face, master) in self.map.face_map.iter().enumerate() {
            if let Some(master) = master {
                if addressing[face].is_empty() {
                    addressing[face] = vec![*master];
                    weights[face] = vec![1.0];
                }
            }
        }

        let mut inserted = Vec::new();
        for (face, masters) in addressing.iter_mut().enumerate() {
            if masters.is_empty() {
                *masters = vec![0];
                weights[face] = vec![1.0];
                inserted.push(face);
            }
        }

        Computed {
            addressing: Addressing::Interpolative { addressing, weights },
            inserted,
        }
    }

    fn computed(&self) -> &Computed {
        if self.computed.get().is_none() {
            self.calc_addressing();
        }
        match self.computed.get() {
            Some(computed) => computed,
            None => unreachable!("addressing computed above"),
        }
    }

    pub fn direct_addressing(&self) -> &[usize] {
        if !self.direct {
            fatal_error!(
                "FaceMapper::direct_addressing",
                "faceMapper",
                "Requested direct addressing for an interpolative mapper."
            );
        }
        match &self.computed().addressing {
            Addressing::Direct(addressing) => addressing,
            Addressing::Interpolative { .. } => unreachable!("mapper is direct"),
        }
    }

    pub fn addressing(&self) -> &[Vec<usize>] {
        if self.direct {
            fatal_error!(
                "FaceMapper::addressing",
                "faceMapper",
                "Requested interpolative addressing for a direct mapper."
            );
        }
        match &self.computed().addressing {
            Addressing::Interpolative { addressing, .. } => addressing,
            Addressing::Direct(_) => unreachable!("mapper is interpolative"),
        }
    }

    pub fn weights(&self) -> &[Vec<f64>] {
        if self.direct {
            fatal_error!(
                "FaceMapper::weights",
                "faceMapper",
                "Requested interpolative weights for a direct mapper."
            );
        }
        match &self.computed().addressing {
            Addressing::Interpolative { weights, .. } => weights,
            Addressing::Direct(_) => unreachable!("mapper is interpolative"),
        }
    }

    pub fn inserted_objects(&self) -> bool {
        !self.inserted_object_labels().is_empty()
    }

    /// New faces without a source on the old mesh.
    pub fn inserted_object_labels(&self) -> &[usize] {
        &self.computed().inserted
    }

    /// Drops the computed addressing.
    pub fn clear_out(&mut self) {
        self.computed.take();
    }

    /// Maps per-face `values` of the old mesh onto the new faces. An empty
    /// field maps to zeros.
    pub fn interpolate<T: FieldValue>(&self, values: &[T]) -> Vec<T> {
        if values.is_empty() {
            return vec![T::zero(); self.size()];
        }
        if values.len() != self.size_before_mapping() {
            fatal_error!(
                "FaceMapper::interpolate",
                "faceMapper",
                "field size {} does not match {} old faces",
                values.len(),
                self.size_before_mapping()
            );
        }
        match &self.computed().addressing {
            Addressing::Direct(addressing) => addressing.iter().map(|&i| values[i]).collect(),
            Addressing::Interpolative { addressing, weights } => addressing
                .iter()
                .zip(weights)
                .map(|(masters, w)| {
                    masters
                        .iter()
                        .zip(w)
                        .fold(T::zero(), |acc, (&i, &wi)| acc.add(values[i].scale(wi)))
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Category {
        Direct,
        Interpolated,
        Inserted,
    }

    fn categories(mapper: &FaceMapper, map: &TopoChangeMap) -> Vec<Vec<Category>> {
        let inserted: HashSet<usize> = mapper.inserted_object_labels().iter().copied().collect();
        let interpolated: HashSet<usize> = map
            .faces_from_points_map
            .iter()
            .chain(&map.faces_from_edges_map)
            .chain(&map.faces_from_faces_map)
            .map(ObjectMap::index)
            .collect();
        (0..mapper.size())
            .map(|face| {
                let mut found = Vec::new();
                if inserted.contains(&face) {
                    found.push(Category::Inserted);
                }
                if interpolated.contains(&face) {
                    found.push(Category::Interpolated);
                }
                if map.face_map[face].is_some() && !interpolated.contains(&face) {
                    found.push(Category::Direct);
                }
                found
            })
            .collect()
    }

    #[test]
    fn test_direct_mapping_marks_inserted_faces() {
        let map = TopoChangeMap {
            n_old_faces: 3,
            face_map: vec![Some(2), None, Some(0), None],
            ..Default::default()
        };
        let mapper = FaceMapper::new(&map);
        assert!(mapper.direct());
        assert_eq!(mapper.direct_addressing(), &[2, 0, 0, 0]);
        assert_eq!(mapper.inserted_object_labels(), &[1, 3]);
        assert!(mapper.inserted_objects());
        assert_eq!(mapper.interpolate(&[1.0, 2.0, 3.0]), vec![3.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_interpolative_priority_and_fallbacks() {
        let map = TopoChangeMap {
            n_old_faces: 4,
            face_map: vec![Some(0), Some(1), None, Some(3), None],
            faces_from_points_map: vec![ObjectMap::new(1, vec![0, 2])],
            faces_from_faces_map: vec![ObjectMap::new(2, vec![1, 2, 3])],
            ..Default::default()
        };
        let mapper = FaceMapper::new(&map);
        assert_eq!(mapper.addressing_kind(), AddressingKind::Interpolative);
        assert_eq!(mapper.addressing(), &[vec![0], vec![0, 2], vec![1, 2, 3], vec![3], vec![0]]);
        assert_eq!(mapper.weights()[1], vec![0.5, 0.5]);
        assert_eq!(mapper.weights()[2].len(), 3);
        assert_eq!(mapper.inserted_object_labels(), &[4]);

        let mapped = mapper.interpolate(&[[1.0, 0.0, 0.0], [0.0, 3.0, 0.0], [3.0, 0.0, 0.0], [0.0, 0.0, 3.0]]);
        assert_eq!(mapped[1], [2.0, 0.0, 0.0]);
        assert_eq!(mapped[2], [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_every_face_in_exactly_one_category() {
        let mut rng = fastrand::Rng::with_seed(3);
        for _ in 0..50 {
            let n_old = rng.usize(1..10);
            let n_new = rng.usize(1..15);
            let face_map: Vec<Option<usize>> = (0..n_new)
                .map(|_| rng.bool().then(|| rng.usize(..n_old)))
                .collect();
            let mut faces: Vec<usize> = (0..n_new).collect();
            rng.shuffle(&mut faces);
            let mut object_maps = faces
                .into_iter()
                .take(rng.usize(..=n_new))
                .map(|face| ObjectMap::new(face, (0..rng.usize(1..4)).map(|_| rng.usize(..n_old)).collect()));
            let map = TopoChangeMap {
                n_old_faces: n_old,
                face_map,
                faces_from_points_map: object_maps.by_ref().take(2).collect(),
                faces_from_edges_map: object_maps.by_ref().take(2).collect(),
                faces_from_faces_map: object_maps.collect(),
                ..Default::default()
            };
            let mapper = FaceMapper::new(&map);
            for (face, found) in categories(&mapper, &map).into_iter().enumerate() {
                assert_eq!(found.len(), 1, "face {} categories {:?}", face, found);
            }
        }
    }

    #[test]
    #[should_panic(expected = "already destination of mapping")]
    fn test_second_writer_is_fatal() {
        let map = TopoChangeMap {
            n_old_faces: 2,
            face_map: vec![None],
            faces_from_points_map: vec![ObjectMap::new(0, vec![0])],
            faces_from_edges_map: vec![ObjectMap::new(0, vec![1])],
            ..Default::default()
        };
        FaceMapper::new(&map).calc_addressing();
    }

    #[test]
    #[should_panic(expected = "Old face 5 is outside 0..3")]
    fn test_master_outside_old_mesh_is_fatal() {
        let map = TopoChangeMap {
            n_old_faces: 3,
            face_map: vec![Some(0), None],
            faces_from_edges_map: vec![ObjectMap::new(1, vec![2, 5])],
            ..Default::default()
        };
        FaceMapper::new(&map).calc_addressing();
    }

    #[test]
    fn test_empty_field_maps_to_zeros() {
        let map = TopoChangeMap {
            n_old_faces: 0,
            face_map: vec![None, None],
            ..Default::default()
        };
        let mapper = FaceMapper::new(&map);
        assert_eq!(mapper.interpolate::<f64>(&[]), vec![0.0, 0.0]);
        assert_eq!(mapper.inserted_object_labels(), &[0, 1]);
    }

    #[test]
    #[should_panic(expected = "Addressing already calculated")]
    fn test_recalculation_is_fatal() {
        let map = TopoChangeMap {
            n_old_faces: 1,
            face_map: vec![Some(0)],
            ..Default::default()
        };
        let mapper = FaceMapper::new(&map);
        mapper.calc_addressing();
        mapper.calc_addressing();
    }

    #[test]
    fn test_clear_out_allows_recalculation() {
        let map = TopoChangeMap {
            n_old_faces: 1,
            face_map: vec![Some(0)],
            ..Default::default()
        };
        let mut mapper = FaceMapper::new(&map);
        mapper.calc_addressing();
        mapper.clear_out();
        mapper.calc_addressing();
        assert!(!mapper.inserted_objects());
    }

    #[test]
    #[should_panic(expected = "direct mapper")]
    fn test_weights_on_direct_mapper_is_fatal() {
        let map = TopoChangeMap {
            n_old_faces: 1,
            face_map: vec![Some(0)],
            ..Default::default()
        };
        FaceMapper::new(&map).weights();
    }
}
