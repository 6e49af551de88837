#![allow(clippy::float_cmp)]
use approx::assert_abs_diff_eq;
use muograph_algorithms::{
    scattering_angles, Error, HitArray, Poca, PocaConfig, ScoreFeature, ScoreMethod, Tracking,
    TrackingConfig, Vec3, VoxelGrid, VoxelIndex,
};

const PLANES: [f64; 6] = [300.0, 200.0, 100.0, -100.0, -200.0, -300.0];

// Hits of a muon travelling along d_in, scattering at vertex, leaving along d_out
fn muon(vertex: Vec3, d_in: Vec3, d_out: Vec3) -> Vec<Vec3> {
    PLANES
        .iter()
        .map(|&z| {
            let d = if z > vertex.z { d_in } else { d_out };
            vertex + d * ((z - vertex.z) / d.z)
        })
        .collect()
}

fn down() -> Vec3 {
    Vec3::new(0.0, 0.0, -1.0)
}

fn vertices() -> Vec<Vec3> {
    vec![
        Vec3::new(5.0, 5.0, 5.0),
        Vec3::new(6.0, 4.0, 3.0),
        Vec3::new(4.5, 5.5, 8.0),
        Vec3::new(-20.0, -20.0, 0.0),
        Vec3::new(200.0, 0.0, 0.0),
        Vec3::new(-35.0, 25.0, -45.0),
    ]
}

fn events() -> Vec<Vec<Vec3>> {
    let v = vertices();
    vec![
        muon(v[0], down(), Vec3::new(0.1, 0.0, -1.0)),
        muon(v[1], Vec3::new(0.05, 0.0, -1.0), Vec3::new(-0.05, 0.1, -1.0)),
        muon(v[2], Vec3::new(0.0, 0.02, -1.0), Vec3::new(0.2, 0.0, -1.0)),
        // straight through, removed by the angle cut
        muon(v[3], down(), down()),
        // scatters outside the VOI
        muon(v[4], down(), Vec3::new(0.0, -0.1, -1.0)),
        muon(v[5], Vec3::new(-0.1, 0.1, -1.0), Vec3::new(0.05, 0.05, -1.0)),
    ]
}

fn voi() -> VoxelGrid {
    VoxelGrid::new(Vec3::zeros(), Vec3::repeat(100.0), 10.0).unwrap()
}

fn reconstruct(parallel: bool) -> Poca {
    let hits = HitArray::from_events(&events()).unwrap();
    let tracking = Tracking::with_config(
        hits,
        None,
        &TrackingConfig::new().with_parallel(parallel),
    )
    .unwrap();
    Poca::new(tracking, voi(), PocaConfig::new().with_parallel(parallel)).unwrap()
}

#[test]
fn test_angle_cut_removes_straight_tracks() {
    let poca = reconstruct(true);
    assert_eq!(poca.all_tracks().n_event(), 6);
    assert_eq!(poca.parallel_mask(), &[true, true, true, false, true, true]);
    assert_eq!(poca.tracks().n_event(), 5);
    assert_eq!(poca.poca_points().len(), 5);
    assert_abs_diff_eq!(poca.all_tracks().dtheta()[3], 0.0, epsilon = 1e-9);
}

#[test]
fn test_poca_points_recover_vertices() {
    let poca = reconstruct(true);
    let v = vertices();
    let expected = [v[0], v[1], v[2], v[4], v[5]];
    for (point, vertex) in poca.poca_points().iter().zip(expected) {
        assert_abs_diff_eq!(*point, vertex, epsilon = 1e-6);
    }
    assert_eq!(poca.mask_in_voi(), &[true, true, true, false, true]);
}

#[test]
fn test_triggered_voxels() {
    let poca = reconstruct(true);
    assert_eq!(
        poca.triggered_voxels(),
        &[
            VoxelIndex::new(5, 5, 5),
            VoxelIndex::new(5, 5, 5),
            VoxelIndex::new(5, 5, 5),
            VoxelIndex::OUTSIDE,
            VoxelIndex::new(1, 7, 0),
        ]
    );
}

#[test]
fn test_median_score_per_voxel() {
    let poca = reconstruct(true);
    let feature = [1.0, 2.0, 3.0, 10.0, 20.0];
    let map = poca
        .reconstruct(&feature, &ScoreMethod::Median, None)
        .unwrap();

    assert_eq!(map.scores.dim(), (10, 10, 10));
    assert_eq!(map.scores[[5, 5, 5]], 2.0);
    assert_eq!(map.hits[[5, 5, 5]], 3);
    assert_eq!(map.scores[[1, 7, 0]], 20.0);
    assert_eq!(map.hits[[1, 7, 0]], 1);
    assert_eq!(map.hits.sum(), 4);
    assert_eq!(map.scores[[0, 0, 0]], 0.0);
}

#[test]
fn test_rescoring_with_mask_and_method() {
    let poca = reconstruct(true);
    let feature = [1.0, 2.0, 3.0, 10.0, 20.0];
    let mask = [true, false, true, true, true];
    let map = poca
        .reconstruct(&feature, &ScoreMethod::Mean, Some(&mask))
        .unwrap();
    assert_eq!(map.scores[[5, 5, 5]], 2.0);
    assert_eq!(map.hits[[5, 5, 5]], 2);

    let dtheta = poca
        .reconstruct_feature(ScoreFeature::Dtheta, &ScoreMethod::Max, None)
        .unwrap();
    let widest = scattering_angles(&Vec3::new(0.0, 0.02, -1.0), &Vec3::new(0.2, 0.0, -1.0));
    assert_abs_diff_eq!(dtheta.scores[[5, 5, 5]], widest.dtheta, epsilon = 1e-9);

    assert!(matches!(
        poca.reconstruct_feature(ScoreFeature::Energy, &ScoreMethod::Median, None),
        Err(Error::Config(_))
    ));
}

#[test]
fn test_misaligned_feature_is_rejected() {
    let poca = reconstruct(true);
    assert!(matches!(
        poca.reconstruct(&[1.0, 2.0], &ScoreMethod::Median, None),
        Err(Error::LengthMismatch { expected: 5, found: 2, .. })
    ));
    assert!(matches!(
        poca.voxel_scores(&[0.0; 5], Some(&[true; 4])),
        Err(Error::LengthMismatch { expected: 5, found: 4, .. })
    ));
}

#[test]
fn test_parallel_and_sequential_agree() {
    let par = reconstruct(true);
    let seq = reconstruct(false);
    assert_eq!(par.poca_points(), seq.poca_points());
    assert_eq!(par.triggered_voxels(), seq.triggered_voxels());
    let feature = par.tracks().dtheta();
    assert_eq!(
        par.reconstruct(feature, &ScoreMethod::Median, None).unwrap(),
        seq.reconstruct(feature, &ScoreMethod::Median, None).unwrap()
    );
}

#[test]
fn test_normalized_points() {
    let poca = reconstruct(true);
    let v = vertices();

    // x range of the in-VOI points is [-35, 6] and is reused on y and z
    let normalized = poca.normalized_poca_points();
    assert_eq!(normalized.len(), 4);
    assert_abs_diff_eq!(normalized[3].x, 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(normalized[1].x, 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(normalized[0].y, (v[0].y + 35.0) / 41.0, epsilon = 1e-6);

    let per_axis = poca.normalized_poca_points_per_axis();
    assert_abs_diff_eq!(per_axis[3].y, 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(per_axis[1].y, 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(per_axis[3].z, 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(per_axis[2].z, 1.0, epsilon = 1e-6);
}

#[test]
fn test_everything_cut() {
    let hits = HitArray::from_events(&[muon(Vec3::zeros(), down(), down())]).unwrap();
    let tracking = Tracking::new(hits).unwrap();
    let poca = Poca::new(tracking, voi(), PocaConfig::default()).unwrap();
    assert_eq!(poca.tracks().n_event(), 0);
    assert!(poca.normalized_poca_points().is_empty());
    let map = poca.reconstruct(&[], &ScoreMethod::Median, None).unwrap();
    assert_eq!(map.hits.sum(), 0);
    poca.validate().unwrap();
}

#[test]
fn test_invalid_cut() {
    let tracking = Tracking::new(HitArray::from_events(&events()).unwrap()).unwrap();
    assert!(matches!(
        Poca::new(tracking, voi(), PocaConfig::new().with_dtheta_cut(-1.0)),
        Err(Error::Config(_))
    ));
}
