use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::color_pipeline::common::error::ColorError;
use crate::color_pipeline::common::Rect;
use crate::color_pipeline::engine::{ColorEngine, EngineConfig, DEFAULT_REFERENCE_WHITE};
use crate::color_pipeline::filter::FilterConfiguration;
use crate::color_pipeline::image::{FlatFieldImage, RawFrame, X_PLANE, Y_PLANE};

const WIDTH: usize = 8;
const HEIGHT: usize = 8;

fn filters(wavelengths: &[u32]) -> Arc<FilterConfiguration> {
    let mut builder = FilterConfiguration::builder().wavelengths(wavelengths.to_vec());
    for &w in wavelengths {
        builder = builder.cmf(w, [0.5, 1.0, 0.25]).illuminant(w, 1.0);
    }
    Arc::new(builder.build())
}

fn calibrated_engine(filters: Arc<FilterConfiguration>, lights: usize) -> ColorEngine {
    let bands = filters.filter_count();
    let config = EngineConfig::builder()
        .dimensions(WIDTH, HEIGHT)
        .light_count(lights)
        .register(false)
        .build();
    let mut engine = ColorEngine::new(config, filters).unwrap();
    engine.add_bias(RawFrame::filled(WIDTH, HEIGHT, 0).unwrap()).unwrap();
    for _ in 0..lights {
        let flat =
            FlatFieldImage::from_planes(WIDTH, HEIGHT, vec![vec![100u16; WIDTH * HEIGHT]; bands])
                .unwrap();
        engine.add_flat_field(flat).unwrap();
    }
    engine
}

fn frame(value: u16) -> RawFrame {
    RawFrame::filled(WIDTH, HEIGHT, value).unwrap()
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for worker");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_full_run_normalizes_to_reference_white() {
    let mut engine = calibrated_engine(filters(&[450, 550]), 2);
    engine.set_wtpt(Rect::new(0, 0, 4, 4)).unwrap();
    for value in [200, 300, 400, 500] {
        engine.add_data_to_queue(frame(value)).unwrap();
    }
    engine.start_async().unwrap();
    let report = engine.wait_for_thread_finish().unwrap().unwrap();

    assert!(report.completed());
    assert_eq!(report.frames_processed, 4);
    assert_eq!(report.whites.len(), 4);
    assert_eq!(report.whites[1].light, 1);
    assert_eq!(report.whites[1].measured, Some(3.0));
    assert!(report.guard.is_clean());

    let master = engine.master().unwrap();
    for c in 0..3 {
        assert!(master
            .plane(c)
            .unwrap()
            .iter()
            .all(|v| (v - DEFAULT_REFERENCE_WHITE).abs() < 1e-5));
    }

    let lab = engine.lab_image(None).unwrap();
    let expected_l = 116.0 * DEFAULT_REFERENCE_WHITE.cbrt() - 16.0;
    assert!((lab.get(0, 3, 3).unwrap() - expected_l).abs() < 1e-3);

    let rgb = engine.display_image(Some(Rect::new(2, 2, 3, 3))).unwrap();
    assert_eq!(rgb.dimensions(), (3, 3));
    let first = rgb.get(0, 0, 0).unwrap();
    assert!(first > 200);
    assert!(rgb.plane(0).unwrap().iter().all(|&v| v == first));
}

#[test]
fn test_stop_joins_after_queued_frames() {
    let mut engine = calibrated_engine(filters(&[450, 550]), 2);
    for value in [100, 100, 100] {
        engine.add_data_to_queue(frame(value)).unwrap();
    }
    engine.start_async().unwrap();
    wait_until(|| engine.frames_processed() == 3);
    assert!(engine.is_running());

    let report = engine.stop_async().unwrap().unwrap();
    assert_eq!(report.frames_processed, 3);
    assert!(report.poison_received);
    assert!(report.cancelled);
    assert!(!engine.is_running());
    assert!(!engine.has_master());
    assert_eq!(engine.queued_frames(), 0);

    // partial accumulation is still readable
    let light0 = engine.light_image(0).unwrap();
    assert!((light0.plane(Y_PLANE).unwrap()[0] - 1.0).abs() < 1e-6);
}

#[test]
fn test_extra_frames_discarded_when_run_completes() {
    let mut engine = calibrated_engine(filters(&[450]), 1);
    engine.add_data_to_queue(frame(100)).unwrap();
    engine.add_data_to_queue(frame(100)).unwrap();
    engine.add_data_to_queue(frame(100)).unwrap();
    engine.start_async().unwrap();
    let report = engine.wait_for_thread_finish().unwrap().unwrap();
    assert_eq!(report.frames_processed, 1);
    assert_eq!(report.frames_discarded, 2);
    assert_eq!(engine.queued_frames(), 0);

    assert!(engine.stop_async().unwrap().is_none());
    assert!(engine.has_master());
}

#[test]
fn test_leftover_frames_do_not_reach_next_run() {
    let mut engine = calibrated_engine(filters(&[450]), 1);
    for _ in 0..3 {
        engine.add_data_to_queue(frame(100)).unwrap();
    }
    engine.start_async().unwrap();
    engine.wait_for_thread_finish().unwrap();

    engine.add_data_to_queue(frame(300)).unwrap();
    engine.start_async().unwrap();
    let report = engine.wait_for_thread_finish().unwrap().unwrap();
    assert_eq!(report.frames_processed, 1);
    assert_eq!(report.frames_discarded, 0);
    let y = engine.master().unwrap().plane(Y_PLANE).unwrap()[0];
    assert!((y - 3.0).abs() < 1e-6, "Y = {}", y);
}

#[test]
fn test_restart_drops_frames_left_by_unjoined_run() {
    let mut engine = calibrated_engine(filters(&[450]), 1);
    engine.add_data_to_queue(frame(100)).unwrap();
    engine.add_data_to_queue(frame(100)).unwrap();
    engine.start_async().unwrap();
    wait_until(|| !engine.is_running());

    // the previous worker is joined here and its leftover frame dropped
    engine.start_async().unwrap();
    assert_eq!(engine.queued_frames(), 0);
    engine.add_data_to_queue(frame(300)).unwrap();
    engine.wait_for_thread_finish().unwrap();
    let y = engine.master().unwrap().plane(Y_PLANE).unwrap()[0];
    assert!((y - 3.0).abs() < 1e-6, "Y = {}", y);
}

#[test]
fn test_stop_without_worker_is_noop() {
    let mut engine = calibrated_engine(filters(&[450]), 1);
    assert!(engine.stop_async().unwrap().is_none());
    assert!(engine.wait_for_thread_finish().unwrap().is_none());
}

#[test]
fn test_missing_spectral_data_surfaces_on_join() {
    let filters = Arc::new(
        FilterConfiguration::builder()
            .wavelengths(vec![450, 475])
            .cmf(450, [0.5, 1.0, 0.25])
            .illuminant(450, 1.0)
            .illuminant(475, 1.0)
            .build(),
    );
    let mut engine = calibrated_engine(filters, 1);
    engine.add_data_to_queue(frame(200)).unwrap();
    engine.add_data_to_queue(frame(200)).unwrap();
    engine.start_async().unwrap();

    assert!(matches!(
        engine.wait_for_thread_finish(),
        Err(ColorError::MissingSpectralData { wavelength: 475 })
    ));
    assert!(!engine.has_master());
    // band 0 was integrated before the failure
    let light0 = engine.light_image(0).unwrap();
    assert!((light0.plane(X_PLANE).unwrap()[0] - 2.0).abs() < 1e-6);
}

#[test]
fn test_light_weights_rebuild_master() {
    let mut engine = calibrated_engine(filters(&[450, 550]), 2);
    assert!(matches!(
        engine.display_image(None),
        Err(ColorError::EngineState(_))
    ));

    // wavelength-major: (450, light 0), (450, light 1), (550, light 0), ...
    for value in [100, 50, 100, 50] {
        engine.add_data_to_queue(frame(value)).unwrap();
    }
    engine.start_async().unwrap();
    engine.wait_for_thread_finish().unwrap();

    let y = |engine: &ColorEngine| engine.master().unwrap().plane(Y_PLANE).unwrap()[0];
    assert!((y(&engine) - 0.75).abs() < 1e-6);

    engine.set_light_weights(&[1.0, 0.0]).unwrap();
    assert!((y(&engine) - 1.0).abs() < 1e-6);

    engine.set_light_levels(&[1, 3]).unwrap();
    assert!((y(&engine) - 0.625).abs() < 1e-6);

    assert!(matches!(
        engine.set_light_weights(&[1.0]),
        Err(ColorError::InvalidWeights(_))
    ));
    assert!((y(&engine) - 0.625).abs() < 1e-6);

    engine.set_light_weights_resized(&[0.5, 0.5], 4).unwrap();
    assert_eq!(engine.master().unwrap().dimensions(), (4, 4));
}

#[test]
fn test_start_requires_complete_inputs() {
    let config = EngineConfig::builder()
        .dimensions(WIDTH, HEIGHT)
        .light_count(2)
        .register(false)
        .build();
    let mut engine = ColorEngine::new(config, filters(&[450])).unwrap();
    assert!(matches!(engine.start_async(), Err(ColorError::EngineState(_))));

    let config = EngineConfig::builder()
        .dimensions(WIDTH, HEIGHT)
        .light_count(1)
        .build();
    let mut engine = ColorEngine::new(config, filters(&[450])).unwrap();
    engine
        .add_flat_field(FlatFieldImage::from_planes(WIDTH, HEIGHT, vec![vec![1u16; 64]]).unwrap())
        .unwrap();
    // registration is on by default and needs targets
    assert!(matches!(engine.start_async(), Err(ColorError::EngineState(_))));
}

#[test]
fn test_inputs_validated_eagerly() {
    let mut engine = calibrated_engine(filters(&[450]), 1);
    assert!(matches!(
        engine.add_data_to_queue(RawFrame::filled(4, 4, 0).unwrap()),
        Err(ColorError::ShapeMismatch { .. })
    ));
    assert!(matches!(
        engine.set_wtpt(Rect::new(6, 6, 4, 4)),
        Err(ColorError::RectOutOfBounds { .. })
    ));
    assert!(matches!(
        engine.set_reg_targets(&[Rect::new(0, 0, 2, 2)]),
        Err(ColorError::RegistrationTargetCountInvalid(1))
    ));
    assert!(matches!(
        engine.add_flat_field(FlatFieldImage::new(1, WIDTH, HEIGHT).unwrap()),
        Err(ColorError::EngineState(_))
    ));
    assert!(matches!(
        engine.add_bias(RawFrame::filled(2, 2, 0).unwrap()),
        Err(ColorError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_calibration_locked_while_running() {
    let mut engine = calibrated_engine(filters(&[450]), 1);
    engine.start_async().unwrap();
    assert!(matches!(engine.start_async(), Err(ColorError::EngineState(_))));
    assert!(matches!(
        engine.add_bias(frame(0)),
        Err(ColorError::EngineState(_))
    ));
    assert!(matches!(
        engine.set_wtpt(Rect::new(0, 0, 2, 2)),
        Err(ColorError::EngineState(_))
    ));
    let report = engine.stop_async().unwrap().unwrap();
    assert_eq!(report.frames_processed, 0);
    assert!(engine.add_bias(frame(0)).is_ok());
}

#[test]
fn test_engine_restarts_with_fresh_accumulators() {
    let mut engine = calibrated_engine(filters(&[450]), 1);
    engine.add_data_to_queue(frame(100)).unwrap();
    engine.start_async().unwrap();
    engine.wait_for_thread_finish().unwrap();

    engine.add_data_to_queue(frame(300)).unwrap();
    engine.start_async().unwrap();
    engine.wait_for_thread_finish().unwrap();
    let y = engine.master().unwrap().plane(Y_PLANE).unwrap()[0];
    assert!((y - 3.0).abs() < 1e-6);
}

fn ring_frame(width: usize, height: usize, centers: &[(f32, f32)], scale: f32) -> RawFrame {
    let mut data = vec![1000u16; width * height];
    for y in 0..height {
        for x in 0..width {
            for &(cx, cy) in centers {
                let r = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
                if r < 10.0 {
                    data[y * width + x] = (1000.0 + 800.0 * (r * 1.3).cos() * scale) as u16;
                }
            }
        }
    }
    RawFrame::new(width, height, data).unwrap()
}

#[test]
fn test_registration_runs_for_later_bands() {
    let (width, height) = (64, 32);
    let filters = filters(&[450, 550, 650]);
    let config = EngineConfig::builder()
        .dimensions(width, height)
        .light_count(1)
        .register(true)
        .build();
    let mut engine = ColorEngine::new(config, filters).unwrap();
    engine
        .add_flat_field(
            FlatFieldImage::from_planes(width, height, vec![vec![1000u16; width * height]; 3])
                .unwrap(),
        )
        .unwrap();
    engine
        .set_reg_targets(&[Rect::new(0, 0, 32, 32), Rect::new(32, 0, 32, 32)])
        .unwrap();
    engine.set_wtpt(Rect::new(0, 0, 4, 4)).unwrap();

    let centers = [(16.0, 16.0), (48.0, 16.0)];
    for scale in [1.0, 0.9, 1.1] {
        engine
            .add_data_to_queue(ring_frame(width, height, &centers, scale))
            .unwrap();
    }
    engine.start_async().unwrap();
    let report = engine.wait_for_thread_finish().unwrap().unwrap();

    assert_eq!(report.registrations.len(), 2);
    for entry in &report.registrations {
        assert!(entry.band > 0);
        assert!((entry.registration.transform.scale - 1.0).abs() < 0.01);
        assert!(entry.registration.transform.tx.abs() < 0.5);
        assert!(entry.registration.transform.ty.abs() < 0.5);
    }
    assert!(engine.has_master());
}

#[test]
fn test_archive_written_after_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("planes.tif");
    let config = EngineConfig::builder()
        .dimensions(WIDTH, HEIGHT)
        .light_count(1)
        .register(false)
        .archive_path(&path)
        .illuminant_name("D65")
        .build();
    let mut engine = ColorEngine::new(config, filters(&[450, 550])).unwrap();
    engine
        .add_flat_field(
            FlatFieldImage::from_planes(WIDTH, HEIGHT, vec![vec![100u16; WIDTH * HEIGHT]; 2])
                .unwrap(),
        )
        .unwrap();
    engine.set_wtpt(Rect::new(0, 0, 2, 2)).unwrap();
    engine.add_data_to_queue(frame(200)).unwrap();
    engine.add_data_to_queue(frame(400)).unwrap();
    engine.start_async().unwrap();
    engine.wait_for_thread_finish().unwrap();

    let file = std::fs::File::open(&path).unwrap();
    let mut decoder = tiff::decoder::Decoder::new(file).unwrap();
    let tag = crate::color_pipeline::archive::ArchiveTag::MeasuredWhite.tag();
    assert!((decoder.get_tag_f32(tag).unwrap() - 2.0).abs() < 1e-6);
    assert!(decoder.more_images());
    decoder.next_image().unwrap();
    assert!((decoder.get_tag_f32(tag).unwrap() - 4.0).abs() < 1e-6);
}

#[test]
fn test_archive_without_white_rect_has_no_measured_tag() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("unnormalized.tif");
    let config = EngineConfig::builder()
        .dimensions(WIDTH, HEIGHT)
        .light_count(1)
        .register(false)
        .archive_path(&path)
        .build();
    let mut engine = ColorEngine::new(config, filters(&[450])).unwrap();
    engine
        .add_flat_field(
            FlatFieldImage::from_planes(WIDTH, HEIGHT, vec![vec![100u16; WIDTH * HEIGHT]]).unwrap(),
        )
        .unwrap();
    engine.add_data_to_queue(frame(200)).unwrap();
    engine.start_async().unwrap();
    let report = engine.wait_for_thread_finish().unwrap().unwrap();
    assert_eq!(report.whites[0].measured, None);

    let file = std::fs::File::open(&path).unwrap();
    let mut decoder = tiff::decoder::Decoder::new(file).unwrap();
    let measured = crate::color_pipeline::archive::ArchiveTag::MeasuredWhite.tag();
    assert!(decoder.find_tag(measured).unwrap().is_none());
    let reference = crate::color_pipeline::archive::ArchiveTag::ReferenceWhite.tag();
    assert!((decoder.get_tag_f32(reference).unwrap() - DEFAULT_REFERENCE_WHITE).abs() < 1e-6);
}

#[test]
fn test_light_weights_applied_while_running() {
    let mut engine = calibrated_engine(filters(&[450, 550]), 2);
    // band 450: light 0 then light 1
    engine.add_data_to_queue(frame(100)).unwrap();
    engine.add_data_to_queue(frame(200)).unwrap();
    engine.start_async().unwrap();
    wait_until(|| engine.frames_processed() == 2);
    assert!(engine.is_running());

    engine.set_light_weights(&[0.25, 0.75]).unwrap();
    let y = engine.master().unwrap().plane(Y_PLANE).unwrap()[0];
    assert!((y - 1.75).abs() < 1e-6, "partial Y = {}", y);
    assert!(engine.is_running());

    engine.add_data_to_queue(frame(100)).unwrap();
    engine.add_data_to_queue(frame(200)).unwrap();
    let report = engine.wait_for_thread_finish().unwrap().unwrap();
    assert_eq!(report.frames_processed, 4);
    let y = engine.master().unwrap().plane(Y_PLANE).unwrap()[0];
    assert!((y - 1.5).abs() < 1e-6, "final Y = {}", y);

    engine.set_light_weights(&[0.25, 0.75]).unwrap();
    let y = engine.master().unwrap().plane(Y_PLANE).unwrap()[0];
    assert!((y - 1.75).abs() < 1e-6, "reweighted Y = {}", y);
}
