//! End-to-end loading runs checked against the physical invariants of a plan.
//!
//! Every run goes through the public pipeline: catalog → LoadProblem →
//! pack() → LoadResult, and the checks below only look at the result.

use container_loader::model::expand_catalog;
use container_loader::optimizer::{GaConfig, GreedyConfig, HybridConfig, greedy};
use container_loader::{
    Box3D, ConstraintFlags, Container, Group, ItemSpec, LoadProblem, LoadResult, PackingError,
    RunContext, pack,
};
use container_loader::Strategy as PackStrategy;
use proptest::prelude::*;

const EPS: f64 = 1e-6;
const TOUCH: f64 = 0.01;
const SUPPORT_RATIO: f64 = 0.70;

fn small_greedy() -> GreedyConfig {
    GreedyConfig {
        restarts: 3,
        passes: 2,
        grid_samples: 4,
        compaction: true,
        seed: Some(42),
    }
}

fn small_ga() -> GaConfig {
    GaConfig {
        population_size: 16,
        generations: 4,
        elitism: 2,
        tournament_size: 3,
        seed: Some(7),
        ..GaConfig::default()
    }
}

fn strategies() -> Vec<PackStrategy> {
    vec![
        PackStrategy::Blf,
        PackStrategy::Greedy(small_greedy()),
        PackStrategy::Genetic(small_ga()),
        PackStrategy::Hybrid(HybridConfig {
            greedy: small_greedy(),
            ..HybridConfig::default()
        }),
    ]
}

fn run(problem: &LoadProblem, strategy: &PackStrategy) -> LoadResult {
    pack(problem, strategy, &RunContext::none(), &[]).expect("run should succeed")
}

fn overlap_1d(a0: f64, a1: f64, b0: f64, b1: f64) -> f64 {
    (a1.min(b1) - a0.max(b0)).max(0.0)
}

/// Asserts every invariant a finished plan must satisfy.
fn assert_physically_valid(problem: &LoadProblem, result: &LoadResult) {
    let container = problem.container();
    let items = &result.placed_items;

    // Containment
    for item in items {
        assert!(item.x >= -EPS && item.y >= -EPS && item.z >= -EPS, "{} below origin", item.id);
        assert!(item.x + item.length <= container.length + EPS, "{} exceeds length", item.id);
        assert!(item.y + item.width <= container.width + EPS, "{} exceeds width", item.id);
        assert!(item.z + item.height <= container.height + EPS, "{} exceeds height", item.id);
    }

    // No-overlap
    for (i, a) in items.iter().enumerate() {
        for b in &items[i + 1..] {
            let volume = overlap_1d(a.x, a.x + a.length, b.x, b.x + b.length)
                * overlap_1d(a.y, a.y + a.width, b.y, b.y + b.width)
                * overlap_1d(a.z, a.z + a.height, b.z, b.z + b.height);
            assert!(volume <= EPS, "{} overlaps {}", a.id, b.id);
        }
    }

    // Capacity
    let total_weight: f64 = items.iter().map(|item| item.weight).sum();
    assert!((total_weight - result.total_weight).abs() < 1e-6);
    if problem.flags().enforce_load_capacity {
        assert!(total_weight <= container.max_weight + EPS, "capacity exceeded");
    }

    // Fill-rate consistency
    let volume: f64 = items.iter().map(|item| item.length * item.width * item.height).sum();
    let expected = 100.0 * volume / (container.length * container.width * container.height);
    assert!((result.fill_rate - expected).abs() < 1e-6, "fill rate {} != {}", result.fill_rate, expected);

    // Stability
    if problem.flags().enforce_stacking {
        let limit = |id: &str| {
            problem
                .boxes()
                .iter()
                .find(|object| object.id == id)
                .map(Box3D::stack_limit)
                .unwrap_or(f64::INFINITY)
        };
        for (i, upper) in items.iter().enumerate() {
            if upper.z <= EPS {
                continue;
            }
            let mut supported = 0.0;
            for (j, lower) in items.iter().enumerate() {
                if i == j || (lower.z + lower.height - upper.z).abs() > TOUCH {
                    continue;
                }
                let area = overlap_1d(upper.x, upper.x + upper.length, lower.x, lower.x + lower.length)
                    * overlap_1d(upper.y, upper.y + upper.width, lower.y, lower.y + lower.width);
                if area <= EPS {
                    continue;
                }
                supported += area;
                assert!(
                    upper.weight <= lower.weight + EPS,
                    "{} rests on lighter {}",
                    upper.id,
                    lower.id
                );
            }
            let base = upper.length * upper.width;
            assert!(
                supported / base >= SUPPORT_RATIO - EPS,
                "{} only {:.2} supported",
                upper.id,
                supported / base
            );
        }

        for lower in items {
            let load: f64 = items
                .iter()
                .filter(|upper| upper.id != lower.id && (lower.z + lower.height - upper.z).abs() <= TOUCH)
                .filter(|upper| {
                    overlap_1d(upper.x, upper.x + upper.length, lower.x, lower.x + lower.length)
                        * overlap_1d(upper.y, upper.y + upper.width, lower.y, lower.y + lower.width)
                        > EPS
                })
                .map(|upper| upper.weight)
                .sum();
            assert!(load <= limit(&lower.id) + EPS, "{} carries {} over its limit", lower.id, load);
        }
    }

    // Partition
    assert_eq!(items.len() + result.unplaced_items.len(), problem.len());
}

fn spareparts_problem(flags: ConstraintFlags) -> LoadProblem {
    let container = Container::new((591.9, 234.0, 238.0), 18725.0).unwrap();
    let boxes = expand_catalog(&[ItemSpec::new("Spareparts", (53.0, 53.0, 76.0), 20.0, 35)]).unwrap();
    LoadProblem::new(container, boxes, flags).unwrap()
}

#[test]
fn spareparts_fill_a_forty_foot_container() {
    let problem = spareparts_problem(ConstraintFlags::default());
    let result = run(&problem, &PackStrategy::Blf);

    assert!(!result.placed_items.is_empty());
    assert!(result.fill_rate > 0.0);
    assert_physically_valid(&problem, &result);
}

#[test]
fn overweight_box_is_reported_unplaced() {
    let flags = ConstraintFlags {
        enforce_load_capacity: true,
        ..ConstraintFlags::default()
    };
    let container = Container::new((100.0, 100.0, 100.0), 10.0).unwrap();
    let boxes = vec![Box3D::new("Heavy_1", (10.0, 10.0, 10.0), 20.0).unwrap()];
    let problem = LoadProblem::new(container, boxes, flags).unwrap();

    for strategy in strategies() {
        let result = run(&problem, &strategy);
        assert!(result.placed_items.is_empty(), "{:?}", strategy.algorithm());
        assert_eq!(result.unplaced_items.len(), 1);
        assert_eq!(result.unplaced_items[0].id, "Heavy_1");
        assert_eq!(result.unplaced_items[0].reason_code, "too_heavy_for_container");
    }
}

#[test]
fn stack_limit_keeps_second_box_off_the_first() {
    let flags = ConstraintFlags {
        enforce_stacking: true,
        ..ConstraintFlags::default()
    };
    let boxes = vec![
        Box3D::new("Fragile_1", (10.0, 10.0, 10.0), 5.0)
            .unwrap()
            .with_max_stack_weight(3.0),
        Box3D::new("Fragile_2", (10.0, 10.0, 10.0), 5.0).unwrap(),
    ];

    // Only a tower would fit.
    let tower = Container::new((10.0, 10.0, 20.0), 100.0).unwrap();
    let problem = LoadProblem::new(tower, boxes.clone(), flags).unwrap();
    let result = run(&problem, &PackStrategy::Blf);
    assert_eq!(result.placed_items.len(), 1);
    assert_eq!(result.placed_items[0].id, "Fragile_1");
    assert_eq!(result.unplaced_items[0].id, "Fragile_2");
    assert_eq!(result.unplaced_items[0].reason_code, "no_feasible_position");

    // Side by side works.
    let wide = Container::new((20.0, 10.0, 10.0), 100.0).unwrap();
    let problem = LoadProblem::new(wide, boxes, flags).unwrap();
    for strategy in strategies() {
        let result = run(&problem, &strategy);
        assert!(result.is_complete(), "{:?}", strategy.algorithm());
        assert!(result.placed_items.iter().all(|item| item.z.abs() < EPS));
        assert_physically_valid(&problem, &result);
    }
}

#[test]
fn priority_without_flag_rejects_the_run() {
    let container = Container::new((100.0, 100.0, 100.0), 100.0).unwrap();
    let boxes = vec![Box3D::new("Urgent_1", (10.0, 10.0, 10.0), 1.0).unwrap().with_priority(1)];
    let err = LoadProblem::new(container, boxes, ConstraintFlags::default()).unwrap_err();
    assert_eq!(
        err,
        PackingError::ConstraintFieldWithoutFlag {
            box_id: "Urgent_1".to_string(),
            field: "priority",
            flag: "enforcePriority",
        }
    );
}

#[test]
fn all_strategies_respect_every_rule() {
    let container = Container::new((120.0, 80.0, 80.0), 400.0).unwrap();
    let mut items = vec![
        ItemSpec::new("Pallet", (40.0, 40.0, 30.0), 60.0, 4),
        ItemSpec::new("Carton", (30.0, 20.0, 20.0), 15.0, 8),
        ItemSpec::new("Tube", (60.0, 10.0, 10.0), 4.0, 6),
    ];
    items[1].max_stack_weight = Some(20.0);
    items[1].priority = Some(2);
    items[2].destination_group = Some(1);
    let boxes = expand_catalog(&items).unwrap();
    let problem = LoadProblem::new(container, boxes, ConstraintFlags::all()).unwrap();

    for strategy in strategies() {
        let result = run(&problem, &strategy);
        assert!(!result.placed_items.is_empty(), "{:?}", strategy.algorithm());
        assert_physically_valid(&problem, &result);
    }
}

#[test]
fn blf_is_deterministic() {
    let flags = ConstraintFlags {
        enforce_stacking: true,
        enforce_load_capacity: true,
        ..ConstraintFlags::default()
    };
    let problem = spareparts_problem(flags);
    let first = run(&problem, &PackStrategy::Blf);
    let second = run(&problem, &PackStrategy::Blf);
    assert_eq!(first, second);
}

#[test]
fn greedy_keeps_the_best_restart() {
    let container = Container::new((100.0, 60.0, 50.0), 1000.0).unwrap();
    let boxes = expand_catalog(&[
        ItemSpec::new("Crate", (35.0, 25.0, 20.0), 10.0, 6),
        ItemSpec::new("Box", (20.0, 20.0, 20.0), 5.0, 10),
    ])
    .unwrap();
    let problem = LoadProblem::new(container, boxes, ConstraintFlags::default()).unwrap();
    let config = GreedyConfig {
        restarts: 4,
        ..small_greedy()
    };

    let (state, fill_rates) = greedy::run_with_fill_rates(&problem, &config, &RunContext::none()).unwrap();
    assert_eq!(fill_rates.len(), 4);
    let best = fill_rates.iter().copied().fold(f64::MIN, f64::max);
    assert!(fill_rates.iter().all(|rate| state.fill_rate() >= *rate));
    assert!((state.fill_rate() - best).abs() < 1e-9);
}

#[test]
fn groups_color_the_placed_items() {
    let problem = spareparts_problem(ConstraintFlags::default());
    let groups = [Group::new("Spareparts", "#4f9d69")];
    let result = pack(&problem, &PackStrategy::Blf, &RunContext::none(), &groups).unwrap();
    assert!(result.placed_items.iter().all(|item| item.color == "#4f9d69"));
    assert!(result.placed_items.iter().all(|item| item.id.starts_with("Spareparts_")));
}

#[test]
fn empty_catalog_yields_empty_result() {
    let container = Container::new((10.0, 10.0, 10.0), 10.0).unwrap();
    let problem = LoadProblem::new(container, Vec::new(), ConstraintFlags::all()).unwrap();
    for strategy in strategies() {
        let result = run(&problem, &strategy);
        assert!(result.placed_items.is_empty());
        assert!(result.unplaced_items.is_empty());
        assert_eq!(result.fill_rate, 0.0);
    }
}

fn arb_flags() -> impl Strategy<Value = ConstraintFlags> {
    (any::<bool>(), any::<bool>()).prop_map(|(capacity, stacking)| ConstraintFlags {
        enforce_load_capacity: capacity,
        enforce_stacking: stacking,
        ..ConstraintFlags::default()
    })
}

fn arb_boxes() -> impl Strategy<Value = Vec<Box3D>> {
    prop::collection::vec((1u32..=30, 1u32..=30, 1u32..=30, 1u32..=40), 1..12).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (l, w, h, weight))| {
                Box3D::new(format!("Random_{}", i + 1), (l as f64, w as f64, h as f64), weight as f64)
                    .expect("generated box is valid")
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn blf_plans_are_physically_valid(boxes in arb_boxes(), flags in arb_flags()) {
        let container = Container::new((50.0, 40.0, 30.0), 150.0).unwrap();
        let problem = LoadProblem::new(container, boxes, flags).unwrap();
        let result = run(&problem, &PackStrategy::Blf);
        assert_physically_valid(&problem, &result);
    }

    #[test]
    fn greedy_plans_are_physically_valid(boxes in arb_boxes(), flags in arb_flags()) {
        let container = Container::new((50.0, 40.0, 30.0), 150.0).unwrap();
        let problem = LoadProblem::new(container, boxes, flags).unwrap();
        let result = run(&problem, &PackStrategy::Greedy(small_greedy()));
        assert_physically_valid(&problem, &result);
    }
}
