//! End-to-end regeneration scenarios over the mock engine

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use glam::Vec3;
use rk_kernel::{BooleanType, MockEngine, ShapeKind};
use rk_param::feature::{BlendFeature, BoxFeature, FeatureKind, InstanceLinearFeature};
use rk_param::{
    Feature, FeatureId, GraphError, Identifier, InputType, ModelConfig, ParameterValue, Pick,
    PickError, Project, ProjectError, Source, StateChange,
};

fn new_project() -> Project {
    Project::new("test", Arc::new(ModelConfig::default()))
}

fn add_box(project: &mut Project, name: &str, origin: Vec3, size: Vec3) -> FeatureId {
    let feature = Feature::new_box(name, project.config());
    let id = project.add_feature(feature).unwrap();
    project
        .set_parameter(id, BoxFeature::ORIGIN, ParameterValue::Vector(origin))
        .unwrap();
    for (name, value) in [
        (BoxFeature::LENGTH, size.x),
        (BoxFeature::WIDTH, size.y),
        (BoxFeature::HEIGHT, size.z),
    ] {
        project
            .set_parameter(id, name, ParameterValue::Float(value))
            .unwrap();
    }
    id
}

fn add_boolean(project: &mut Project, op: BooleanType, target: FeatureId, tool: FeatureId) -> FeatureId {
    let id = project
        .add_feature(Feature::new_boolean(op.name(), op))
        .unwrap();
    project.connect(target, id, InputType::target()).unwrap();
    project.connect(tool, id, InputType::tool()).unwrap();
    id
}

fn add_blend(project: &mut Project, target: FeatureId) -> FeatureId {
    let feature = Feature::new_blend("blend", project.config());
    let id = project.add_feature(feature).unwrap();
    project.connect(target, id, InputType::target()).unwrap();
    id
}

fn push_edge_pick(project: &mut Project, blend: FeatureId, pick: Pick) {
    project
        .edit_feature(blend, |feature| {
            if let FeatureKind::Blend(b) = feature.kind_mut() {
                b.edges.push(pick);
            }
        })
        .unwrap();
}

fn ids_of_kind(project: &Project, feature: FeatureId, kind: ShapeKind) -> Vec<Identifier> {
    project
        .feature(feature)
        .unwrap()
        .store()
        .entries()
        .into_iter()
        .filter(|e| e.kind == kind)
        .map(|e| e.id)
        .collect()
}

fn all_ids(project: &Project) -> BTreeMap<FeatureId, BTreeSet<Identifier>> {
    project
        .features()
        .map(|f| (f.id(), f.store().all_identifiers()))
        .collect()
}

/// Box -> Blend on one edge, both regenerated
fn blended_box(project: &mut Project, engine: &mut MockEngine) -> (FeatureId, FeatureId, Identifier) {
    let base = add_box(project, "base", Vec3::ZERO, Vec3::splat(10.0));
    let blend = add_blend(project, base);
    project.update(engine);

    let edge = ids_of_kind(project, base, ShapeKind::Edge)[0];
    let pick = project.capture_pick(base, edge, InputType::TARGET);
    push_edge_pick(project, blend, pick);
    let report = project.update(engine);
    assert_eq!(report.regenerated, vec![blend]);
    (base, blend, edge)
}

#[test]
fn test_cycle_leaves_single_edge() {
    let mut project = new_project();
    let f1 = add_box(&mut project, "f1", Vec3::ZERO, Vec3::ONE);
    let f2 = project
        .add_feature(Feature::new_blend("f2", project.config()))
        .unwrap();

    project.connect(f1, f2, InputType::target()).unwrap();
    let err = project.connect(f2, f1, InputType::target()).unwrap_err();
    assert!(matches!(err, ProjectError::Graph(GraphError::Cycle { .. })));

    let edges = project.graph().edges();
    assert_eq!(edges.len(), 1);
    assert_eq!((edges[0].source, edges[0].target), (f1, f2));
}

#[test]
fn test_stores_are_consistent_after_update() {
    let mut project = new_project();
    let mut engine = MockEngine::new();
    let a = add_box(&mut project, "a", Vec3::ZERO, Vec3::splat(10.0));
    let b = add_box(&mut project, "b", Vec3::new(5.0, 5.0, 5.0), Vec3::splat(10.0));
    let union = add_boolean(&mut project, BooleanType::Union, a, b);
    let common = add_boolean(&mut project, BooleanType::Intersect, a, b);
    let pattern = project
        .add_feature(Feature::new_instance_linear("pattern", project.config()))
        .unwrap();
    project.connect(union, pattern, InputType::source()).unwrap();

    let report = project.update(&mut engine);
    assert!(report.failed.is_empty(), "{:?}", report.failed);
    assert_eq!(report.regenerated.len(), 5);
    assert_eq!(*report.regenerated.last().unwrap(), pattern);

    for feature in project.features() {
        let store = feature.store();
        assert!(store.ensure_no_nils().is_ok(), "{}", feature.name());
        assert!(store.ensure_no_duplicates().is_ok(), "{}", feature.name());
        assert!(feature.last_update_log().is_empty());
    }
    assert_eq!(ids_of_kind(&project, common, ShapeKind::Face).len(), 6);
}

#[test]
fn test_second_update_does_nothing() {
    let mut project = new_project();
    let mut engine = MockEngine::new();
    blended_box(&mut project, &mut engine);

    let before = all_ids(&project);
    let report = project.update(&mut engine);
    assert_eq!(report.attempted(), 0);
    assert_eq!(all_ids(&project), before);
}

#[test]
fn test_independent_regenerations_agree() {
    let mut project = new_project();
    let mut engine = MockEngine::new();
    let a = add_box(&mut project, "a", Vec3::ZERO, Vec3::splat(10.0));
    let b = add_box(&mut project, "b", Vec3::new(4.0, -1.0, -1.0), Vec3::new(2.0, 12.0, 12.0));
    add_boolean(&mut project, BooleanType::Subtract, a, b);
    project.update(&mut engine);
    let bytes = project.to_bytes().unwrap();

    let mut first = Project::load_from_bytes(&bytes, Arc::new(ModelConfig::default())).unwrap();
    let mut second = Project::load_from_bytes(&bytes, Arc::new(ModelConfig::default())).unwrap();
    first.update(&mut MockEngine::new());
    // a busier engine hands out different shape handles
    let mut busy = MockEngine::new();
    for _ in 0..3 {
        rk_kernel::ShapeEngine::make_box(&mut busy, Vec3::ZERO, Vec3::ONE).unwrap();
    }
    second.update(&mut busy);

    assert_eq!(all_ids(&first), all_ids(&second));
    assert_eq!(all_ids(&first), all_ids(&project));
}

#[test]
fn test_union_carries_input_ids() {
    let mut project = new_project();
    let mut engine = MockEngine::new();
    let a = add_box(&mut project, "a", Vec3::ZERO, Vec3::splat(10.0));
    let b = add_box(&mut project, "b", Vec3::new(5.0, 0.0, 0.0), Vec3::splat(10.0));
    let union = add_boolean(&mut project, BooleanType::Union, a, b);
    project.update(&mut engine);

    let result = project.feature(union).unwrap();
    for input in [a, b] {
        for id in ids_of_kind(&project, input, ShapeKind::Face) {
            assert!(result.store().has_id(id));
            assert_eq!(result.ledger().sources_of(id), &[Source::new(input, id)]);
        }
    }
    let root = result.store().root();
    let a_root = project.feature(a).unwrap().store().root();
    let b_root = project.feature(b).unwrap().store().root();
    let sources: BTreeSet<Source> = result.ledger().sources_of(root).iter().copied().collect();
    assert_eq!(
        sources,
        BTreeSet::from([Source::new(a, a_root), Source::new(b, b_root)])
    );
}

#[test]
fn test_split_pieces_devolve_to_target() {
    let mut project = new_project();
    let mut engine = MockEngine::new();
    let a = add_box(&mut project, "a", Vec3::ZERO, Vec3::splat(10.0));
    let slab = add_box(&mut project, "slab", Vec3::new(4.0, -1.0, -1.0), Vec3::new(2.0, 12.0, 12.0));
    let cut = add_boolean(&mut project, BooleanType::Subtract, a, slab);
    project.update(&mut engine);

    let a_root = Source::new(a, project.feature(a).unwrap().store().root());
    let pieces = ids_of_kind(&project, cut, ShapeKind::Solid);
    assert_eq!(pieces.len(), 2);
    assert_ne!(pieces[0], pieces[1]);

    let ledger = project.feature(cut).unwrap().ledger();
    for piece in &pieces {
        assert_eq!(ledger.sources_of(*piece), &[a_root]);
        assert!(project.shape_track_up(cut, *piece).contains(&a_root));
    }
    let down: BTreeSet<Identifier> = project
        .shape_track_down(a_root.feature, a_root.id)
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert!(pieces.iter().all(|p| down.contains(p)));
}

#[test]
fn test_pick_made_before_split_is_ambiguous() {
    let mut project = new_project();
    let mut engine = MockEngine::new();
    let a = add_box(&mut project, "a", Vec3::ZERO, Vec3::splat(10.0));
    // too short in z to cut through: a pocket
    let tool = add_box(&mut project, "tool", Vec3::new(4.0, -1.0, -1.0), Vec3::new(2.0, 12.0, 5.0));
    let cut = add_boolean(&mut project, BooleanType::Subtract, a, tool);
    project.update(&mut engine);

    let cut_root = project.feature(cut).unwrap().store().root();
    let pick = project.capture_pick(cut, cut_root, InputType::TARGET);
    assert_eq!(project.resolve_pick(&pick).unwrap().kind, ShapeKind::Solid);

    project
        .set_parameter(tool, BoxFeature::HEIGHT, ParameterValue::Float(12.0))
        .unwrap();
    let report = project.update(&mut engine);
    assert_eq!(report.regenerated, vec![tool, cut]);
    assert_eq!(ids_of_kind(&project, cut, ShapeKind::Solid).len(), 2);

    match project.resolve_pick(&pick) {
        Err(PickError::Ambiguous { feature, candidates }) => {
            assert_eq!(feature, cut);
            assert_eq!(candidates.len(), 2);
        }
        other => panic!("expected an ambiguous pick, got {other:?}"),
    }
}

#[test]
fn test_blend_pick_survives_resize() {
    let mut project = new_project();
    let mut engine = MockEngine::new();
    let (base, blend, edge) = blended_box(&mut project, &mut engine);
    let blend_ids = project.feature(blend).unwrap().store().all_identifiers();

    project
        .set_parameter(base, BoxFeature::LENGTH, ParameterValue::Float(20.0))
        .unwrap();
    assert!(project.feature(blend).unwrap().is_dirty());
    let report = project.update(&mut engine);
    assert_eq!(report.regenerated, vec![base, blend]);

    let feature = project.feature(blend).unwrap();
    assert!(feature.last_update_log().is_empty());
    assert_eq!(feature.store().all_identifiers(), blend_ids);
    assert!(!feature.store().has_id(edge));
    assert!(!feature.ledger().outputs_from(Source::new(base, edge)).is_empty());
}

#[test]
fn test_failure_state_and_notifications() {
    let mut project = new_project();
    let mut engine = MockEngine::new();
    let (_, blend, _) = blended_box(&mut project, &mut engine);
    let pattern = project
        .add_feature(Feature::new_instance_linear("pattern", project.config()))
        .unwrap();
    project.connect(blend, pattern, InputType::source()).unwrap();
    project
        .set_parameter(pattern, InstanceLinearFeature::COUNT, ParameterValue::Integer(3))
        .unwrap();
    assert!(project.update(&mut engine).failed.is_empty());
    project.take_notifications();

    project
        .set_parameter(blend, BlendFeature::RADIUS, ParameterValue::Float(6.0))
        .unwrap();
    let report = project.update(&mut engine);
    assert_eq!(report.failed, vec![blend, pattern]);

    let failed = project.feature(blend).unwrap();
    assert!(failed.is_failed());
    assert!(failed.store().is_null());
    assert!(failed.last_update_log().starts_with("Error:"));
    let changes = project.take_notifications();
    assert!(changes.contains(&StateChange {
        feature: blend,
        dirty: true,
        failed: true
    }));
    assert_eq!(project.update(&mut engine).attempted(), 0);

    project
        .set_parameter(blend, BlendFeature::RADIUS, ParameterValue::Float(1.0))
        .unwrap();
    let report = project.update(&mut engine);
    assert_eq!(report.regenerated, vec![blend, pattern]);
    assert!(!project.feature(pattern).unwrap().is_failed());
}

#[test]
fn test_soft_pick_failure_keeps_feature_alive() {
    let mut project = new_project();
    let mut engine = MockEngine::new();
    let (_, blend, _) = blended_box(&mut project, &mut engine);

    let stale = Pick::whole(FeatureId::new_v4(), InputType::TARGET);
    push_edge_pick(&mut project, blend, stale);
    let report = project.update(&mut engine);
    assert_eq!(report.regenerated, vec![blend]);
    assert!(project
        .feature(blend)
        .unwrap()
        .last_update_log()
        .contains("selection not valid"));
    assert!(!project.feature(blend).unwrap().store().is_null());
}

#[test]
fn test_remove_feature_reconnects_children() {
    let mut project = new_project();
    let mut engine = MockEngine::new();
    let (base, first, picked) = blended_box(&mut project, &mut engine);

    let second = add_blend(&mut project, first);
    project.update(&mut engine);
    let edge = ids_of_kind(&project, first, ShapeKind::Edge)
        .into_iter()
        .find(|id| project.feature(base).unwrap().store().has_id(*id) && *id != picked)
        .unwrap();
    let pick = project.capture_pick(first, edge, InputType::TARGET);
    push_edge_pick(&mut project, second, pick);
    assert_eq!(project.update(&mut engine).regenerated, vec![second]);

    let removed = project.remove_feature(first).unwrap();
    assert_eq!(removed.id(), first);
    assert!(project.feature(first).is_none());
    assert_eq!(project.graph().parents(second), vec![base]);
    assert!(!project.history().has_feature(first));

    let picks = project.feature(second).unwrap().picks();
    assert_eq!(picks[0].feature, base);
    assert_eq!(picks[0].id, edge);

    let report = project.update(&mut engine);
    assert_eq!(report.regenerated, vec![second]);
    assert!(project.feature(second).unwrap().last_update_log().is_empty());
}

#[test]
fn test_remove_feature_invalidates_created_picks() {
    let mut project = new_project();
    let mut engine = MockEngine::new();
    let (base, first, _) = blended_box(&mut project, &mut engine);

    let second = add_blend(&mut project, first);
    project.update(&mut engine);
    let created = ids_of_kind(&project, first, ShapeKind::Edge)
        .into_iter()
        .find(|id| {
            project
                .history()
                .devolve_history(first, *id)
                .id_in(base)
                .is_none()
        })
        .unwrap();
    let pick = project.capture_pick(first, created, InputType::TARGET);
    push_edge_pick(&mut project, second, pick);
    assert_eq!(project.update(&mut engine).regenerated, vec![second]);

    project.remove_feature(first).unwrap();
    let pick = project.feature(second).unwrap().picks()[0].clone();
    assert_eq!(pick.feature, base);
    assert_eq!(pick.id, created);
    assert!(!pick.is_whole_shape());
    assert!(matches!(
        project.resolve_pick(&pick),
        Err(PickError::NotFound { .. } | PickError::Deleted { .. })
    ));

    let report = project.update(&mut engine);
    assert_eq!(report.failed, vec![second]);
    assert!(report.regenerated.is_empty());
}

#[test]
fn test_save_and_load_reproduce_ids() {
    let mut project = new_project();
    let mut engine = MockEngine::new();
    let (base, _, _) = blended_box(&mut project, &mut engine);
    let other = add_box(&mut project, "other", Vec3::new(5.0, 0.0, 0.0), Vec3::splat(10.0));
    add_boolean(&mut project, BooleanType::Union, base, other);
    assert!(project.update(&mut engine).failed.is_empty());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.ron");
    project.save(&path).unwrap();

    let mut loaded = Project::load(&path, Arc::new(ModelConfig::default())).unwrap();
    assert_eq!(loaded.len(), project.len());
    for feature in loaded.features() {
        assert!(feature.is_dirty());
        assert_eq!(
            feature.store().all_identifiers(),
            project.feature(feature.id()).unwrap().store().all_identifiers()
        );
    }

    let report = loaded.update(&mut MockEngine::new());
    assert!(report.failed.is_empty());
    assert_eq!(all_ids(&loaded), all_ids(&project));
}
