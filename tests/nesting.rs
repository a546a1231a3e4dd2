#![allow(clippy::unwrap_used)]

mod common;

use std::f64::consts::FRAC_PI_2;

use approx::assert_abs_diff_eq;
use sheetfold::error::NestingError;
use sheetfold::flatten::{unfold, Algorithm};
use sheetfold::math::Aabb2;
use sheetfold::nesting::{optimize, MaterialSheet, Nest, NestingConfig, NestingResult};
use sheetfold::pattern::{BuildPattern, Pattern, PatternStore, RotationConstraint};
use sheetfold::SheetfoldError;

use common::{cylinder_strip, init_tracing, rectangle_mesh};

fn squares(count: usize, side: f64) -> PatternStore {
    (0..count)
        .map(|_| Pattern::rectangle(side, side).unwrap())
        .collect()
}

fn overlap_area(a: &Aabb2, b: &Aabb2) -> f64 {
    let w = (a.max.x.min(b.max.x) - a.min.x.max(b.min.x)).max(0.0);
    let h = (a.max.y.min(b.max.y) - a.min.y.max(b.min.y)).max(0.0);
    w * h
}

fn assert_valid_layout(store: &PatternStore, result: &NestingResult) {
    assert_eq!(result.placements.len(), store.len());
    for p in &result.placements {
        let sheet = result.sheets[p.sheet];
        let placed = p.apply(store.get(p.pattern).unwrap()).aabb();
        assert!(placed.min.x >= -1e-9 && placed.min.y >= -1e-9);
        assert!(placed.max.x <= sheet.width + 1e-9);
        assert!(placed.max.y <= sheet.height + 1e-9);
    }
    for (i, a) in result.placements.iter().enumerate() {
        for b in &result.placements[i + 1..] {
            if a.sheet == b.sheet {
                assert!(overlap_area(&a.bounds, &b.bounds) < 1e-9);
            }
        }
    }
}

#[test]
fn two_squares_fill_a_double_sheet() {
    init_tracing();
    let store = squares(2, 10.0);
    let result = optimize(&store, vec![MaterialSheet::new(20.0, 10.0)]).unwrap();
    assert_eq!(result.sheets_used(), 1);
    assert_abs_diff_eq!(result.utilization, 1.0, epsilon = 1e-12);
    assert_valid_layout(&store, &result);
}

#[test]
fn narrow_sheet_needs_a_second_copy() {
    let store = squares(2, 10.0);
    let result = optimize(&store, vec![MaterialSheet::new(15.0, 10.0)]).unwrap();
    assert_eq!(result.sheets_used(), 2);
    assert_eq!(result.on_sheet(0).count(), 1);
    assert_eq!(result.on_sheet(1).count(), 1);
    assert_abs_diff_eq!(result.utilization, 200.0 / 300.0, epsilon = 1e-12);
    assert_valid_layout(&store, &result);
}

#[test]
fn oversized_pattern_is_out_of_material() {
    let store: PatternStore = [Pattern::rectangle(30.0, 5.0).unwrap()]
        .into_iter()
        .collect();
    let err = optimize(&store, vec![MaterialSheet::new(20.0, 20.0)]).unwrap_err();
    assert!(matches!(
        err,
        SheetfoldError::Nesting(NestingError::OutOfMaterial(_))
    ));

    // Allowing a quarter turn does not help a 30-long part on a 20-wide sheet.
    let store: PatternStore = [Pattern::rectangle(30.0, 5.0)
        .unwrap()
        .with_rotation(RotationConstraint::axis_aligned())]
    .into_iter()
    .collect();
    assert!(optimize(&store, vec![MaterialSheet::new(20.0, 20.0)]).is_err());
}

#[test]
fn rotation_lets_a_tall_part_lie_down() {
    let store: PatternStore = [Pattern::rectangle(2.0, 8.0)
        .unwrap()
        .with_rotation(RotationConstraint::Discrete(vec![0.0, FRAC_PI_2]))]
    .into_iter()
    .collect();
    let result = optimize(&store, vec![MaterialSheet::new(10.0, 3.0)]).unwrap();
    assert_abs_diff_eq!(result.placements[0].rotation, FRAC_PI_2, epsilon = 1e-12);
    assert_valid_layout(&store, &result);
}

#[test]
fn unfolded_parts_nest_without_overlap() {
    init_tracing();
    let meshes = [
        cylinder_strip(1.0, FRAC_PI_2, 6, 2.0),
        cylinder_strip(2.0, 1.0, 4, 3.0),
        rectangle_mesh(4.0, 1.5, 2, 1),
        rectangle_mesh(3.0, 3.0, 3, 3),
        cylinder_strip(0.5, FRAC_PI_2, 3, 4.0),
    ];
    let store: PatternStore = meshes
        .iter()
        .map(|mesh| {
            let flat = unfold(mesh, Algorithm::Simple, 1e-6).unwrap();
            BuildPattern::new(&flat)
                .with_rotation(RotationConstraint::axis_aligned())
                .execute()
                .unwrap()
        })
        .collect();

    let config = NestingConfig::new().with_spacing(0.1).with_margin(0.2);
    let result = Nest::new(&store)
        .with_sheets(vec![MaterialSheet::new(6.0, 5.0)])
        .with_config(config)
        .execute()
        .unwrap();
    assert_valid_layout(&store, &result);

    let sheet_area: f64 = result.sheets.iter().map(MaterialSheet::area).sum();
    assert_abs_diff_eq!(
        result.utilization,
        store.total_area() / sheet_area,
        epsilon = 1e-9
    );
    for p in &result.placements {
        let bounds = p.apply(store.get(p.pattern).unwrap()).aabb();
        assert!(bounds.min.x >= 0.2 - 1e-9 && bounds.min.y >= 0.2 - 1e-9);
    }
}

#[test]
fn nesting_is_deterministic() {
    let store: PatternStore = [(3.0, 2.0), (1.0, 4.0), (2.5, 2.5), (5.0, 1.0), (1.0, 1.0)]
        .iter()
        .map(|&(w, h)| {
            Pattern::rectangle(w, h)
                .unwrap()
                .with_rotation(RotationConstraint::Free)
        })
        .collect();
    let run = || optimize(&store, vec![MaterialSheet::new(6.0, 4.0)]).unwrap();
    let first = run();
    let second = run();
    assert_eq!(first.placements, second.placements);
    assert_eq!(first.sheets, second.sheets);
    assert_valid_layout(&store, &first);
}

#[cfg(feature = "serde")]
mod wire {
    use sheetfold::api::{optimize_nesting, unfold, NestingRequest, UnfoldRequest};

    #[test]
    fn unfold_request_round_trips_through_json() {
        let json = r#"{
            "vertices": [[0,0,0],[1,0,0],[1,1,0],[0,1,0],[0,1,1]],
            "faces": [[0,1,2],[0,2,3],[3,2,4]],
            "algorithm": "simple",
            "tolerance": 0.01,
            "generate_fold_lines": true
        }"#;
        let request: UnfoldRequest = serde_json::from_str(json).unwrap();
        let response = unfold(&request).unwrap();
        assert_eq!(response.fold_lines.len(), 1);

        let encoded = serde_json::to_string(&response).unwrap();
        let decoded = serde_json::from_str(&encoded).unwrap();
        assert_eq!(response, decoded);
    }

    #[test]
    fn nesting_request_from_json() {
        let json = r#"{
            "patterns": [
                {"outer": [[0,0],[10,0],[10,10],[0,10]]},
                {"outer": [[0,0],[10,0],[10,10],[0,10]]}
            ],
            "sheets": [{"width": 20, "height": 10}],
            "strategy": "best_fit_decreasing"
        }"#;
        let request: NestingRequest = serde_json::from_str(json).unwrap();
        let response = optimize_nesting(&request).unwrap();
        assert_eq!(response.sheets_used, 1);
        assert!((response.utilization - 1.0).abs() < 1e-12);
    }
}
