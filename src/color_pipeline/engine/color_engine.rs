use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::RwLock;
use tracing::{debug, info, info_span, instrument, warn};

use crate::color_pipeline::archive::{
    ArchiveCompression, ArchivePage, CaptureMetadata, SpectralArchiveWriter, TiffArchiveWriter,
};
use crate::color_pipeline::calibration::CalibrationSet;
use crate::color_pipeline::common::error::{ColorError, Result};
use crate::color_pipeline::common::{Rect, Timer};
use crate::color_pipeline::convert::{
    xyz_to_lab, xyz_to_lab_cropped, xyz_to_srgb, xyz_to_srgb_cropped,
};
use crate::color_pipeline::engine::config::EngineConfig;
use crate::color_pipeline::engine::queue::FrameQueue;
use crate::color_pipeline::engine::report::{EngineReport, FrameRegistration, FrameWhite};
use crate::color_pipeline::filter::FilterConfiguration;
use crate::color_pipeline::fusion::{fuse, fuse_resized, weights_from_levels};
use crate::color_pipeline::image::{FlatFieldImage, LabImage, RawFrame, RgbImage, XyzImage};
use crate::color_pipeline::normalize::{
    median_in_rect, normalize_plane, register_plane, RegistrationOptions, RegistrationTargets,
};
use crate::color_pipeline::spectral::XyzAccumulator;

/// `None` in the queue wakes a blocked worker so it can observe cancellation.
type QueueItem = Option<RawFrame>;

/// State shared between the engine handle and its worker thread.
struct Shared {
    queue: FrameQueue<QueueItem>,
    cancel: AtomicBool,
    processed: AtomicUsize,
    accumulators: RwLock<Vec<XyzAccumulator>>,
    master: RwLock<Option<XyzImage>>,
}

struct ArchiveSettings {
    path: PathBuf,
    compression: ArchiveCompression,
    capture: CaptureMetadata,
}

/// Everything the worker reads, fixed when the run starts.
struct WorkerInputs {
    filters: Arc<FilterConfiguration>,
    calibration: Arc<CalibrationSet>,
    white_rect: Option<Rect>,
    targets: Option<RegistrationTargets>,
    reference_white: Vec<f32>,
    register: bool,
    options: RegistrationOptions,
    width: usize,
    height: usize,
    light_count: usize,
    archive: Option<ArchiveSettings>,
}

/// Threaded spectral-to-color pipeline.
///
/// Frames are queued wavelength-major, light-minor: for each configured
/// filter slot, one frame per light source. A single background worker
/// calibrates, normalizes, registers and integrates each frame into the
/// per-light XYZ accumulators, then fuses them into the master image.
///
/// Calibration inputs (bias, flat fields, white rectangle, registration
/// targets) are locked while the worker runs. Queueing frames, setting
/// light weights and stopping are allowed at any time.
pub struct ColorEngine {
    config: EngineConfig,
    filters: Arc<FilterConfiguration>,
    calibration: Arc<CalibrationSet>,
    white_rect: Option<Rect>,
    targets: Option<RegistrationTargets>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<Result<EngineReport>>>,
}

impl ColorEngine {
    pub fn new(config: EngineConfig, filters: Arc<FilterConfiguration>) -> Result<Self> {
        if config.light_count == 0 {
            return Err(ColorError::EngineState(
                "at least one light source is required".to_string(),
            ));
        }
        if let Some(whites) = &config.reference_white {
            if whites.len() != filters.filter_count() {
                return Err(ColorError::OutOfRange {
                    index: filters.filter_count().saturating_sub(1),
                    count: whites.len(),
                });
            }
        }

        let accumulators = (0..config.light_count)
            .map(|_| XyzAccumulator::new(config.width, config.height))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            width = config.width,
            height = config.height,
            lights = config.light_count,
            bands = filters.filter_count(),
            "Color engine created"
        );
        Ok(Self {
            calibration: Arc::new(CalibrationSet::new(config.width, config.height)),
            config,
            filters,
            white_rect: None,
            targets: None,
            shared: Arc::new(Shared {
                queue: FrameQueue::new(),
                cancel: AtomicBool::new(false),
                processed: AtomicUsize::new(0),
                accumulators: RwLock::new(accumulators),
                master: RwLock::new(None),
            }),
            worker: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn filters(&self) -> &FilterConfiguration {
        &self.filters
    }

    pub fn light_count(&self) -> usize {
        self.config.light_count
    }

    pub fn band_count(&self) -> usize {
        self.filters.filter_count()
    }

    /// Frames one complete run consumes.
    pub fn expected_frames(&self) -> usize {
        self.band_count() * self.light_count()
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Real frames fully processed by the current (or last) run.
    pub fn frames_processed(&self) -> usize {
        self.shared.processed.load(Ordering::SeqCst)
    }

    pub fn queued_frames(&self) -> usize {
        self.shared.queue.len()
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.is_running() {
            return Err(ColorError::EngineState(
                "calibration inputs are locked while the worker runs".to_string(),
            ));
        }
        Ok(())
    }

    pub fn add_bias(&mut self, bias: RawFrame) -> Result<()> {
        self.ensure_idle()?;
        Arc::make_mut(&mut self.calibration).set_bias(bias)
    }

    /// Adds the flat field of the next light source, one plane per filter slot.
    pub fn add_flat_field(&mut self, flat: FlatFieldImage) -> Result<()> {
        self.ensure_idle()?;
        if flat.plane_count() != self.band_count() {
            return Err(ColorError::OutOfRange {
                index: self.band_count().saturating_sub(1),
                count: flat.plane_count(),
            });
        }
        if self.calibration.flat_field_count() >= self.light_count() {
            return Err(ColorError::EngineState(format!(
                "all {} flat fields already added",
                self.light_count()
            )));
        }
        Arc::make_mut(&mut self.calibration).add_flat_field(flat)
    }

    /// Sets the reference-white rectangle.
    pub fn set_wtpt(&mut self, rect: Rect) -> Result<()> {
        self.ensure_idle()?;
        rect.check_within(self.config.width, self.config.height)?;
        self.white_rect = Some(rect);
        Ok(())
    }

    /// Sets the two registration targets.
    pub fn set_reg_targets(&mut self, targets: &[Rect]) -> Result<()> {
        self.ensure_idle()?;
        let targets = RegistrationTargets::new(targets)?;
        targets.check_within(self.config.width, self.config.height)?;
        self.targets = Some(targets);
        Ok(())
    }

    pub fn add_data_to_queue(&self, frame: RawFrame) -> Result<()> {
        frame.check_shape(self.config.width, self.config.height)?;
        self.shared.queue.push(Some(frame));
        Ok(())
    }

    /// Rebuilds the master image from the per-light accumulators.
    ///
    /// During a run the accumulators are read as they are, so the result
    /// reflects only the frames integrated so far.
    pub fn set_light_weights(&self, weights: &[f32]) -> Result<()> {
        let master = fuse(&self.light_images(), Some(weights))?;
        *self.shared.master.write() = Some(master);
        debug!(?weights, "Master rebuilt");
        Ok(())
    }

    /// Like [`set_light_weights`](Self::set_light_weights), resampled to `dest_width`.
    pub fn set_light_weights_resized(&self, weights: &[f32], dest_width: usize) -> Result<()> {
        let master = fuse_resized(&self.light_images(), Some(weights), dest_width)?;
        *self.shared.master.write() = Some(master);
        Ok(())
    }

    /// Weights from integer levels, `level / Σ levels`.
    pub fn set_light_levels(&self, levels: &[u32]) -> Result<()> {
        self.set_light_weights(&weights_from_levels(levels))
    }

    fn light_images(&self) -> Vec<XyzImage> {
        self.shared
            .accumulators
            .read()
            .iter()
            .map(XyzAccumulator::normalized_snapshot)
            .collect()
    }

    /// XYZ image of one light source on the white scale.
    pub fn light_image(&self, light: usize) -> Result<XyzImage> {
        let accumulators = self.shared.accumulators.read();
        accumulators
            .get(light)
            .map(XyzAccumulator::normalized_snapshot)
            .ok_or(ColorError::OutOfRange {
                index: light,
                count: accumulators.len(),
            })
    }

    pub fn has_master(&self) -> bool {
        self.shared.master.read().is_some()
    }

    pub fn master(&self) -> Option<XyzImage> {
        self.shared.master.read().clone()
    }

    /// Display rendering of the master image, optionally cropped.
    pub fn display_image(&self, crop: Option<Rect>) -> Result<RgbImage> {
        let master = self.shared.master.read();
        let master = master.as_ref().ok_or_else(no_master)?;
        match crop {
            Some(rect) => xyz_to_srgb_cropped(master, rect),
            None => xyz_to_srgb(master),
        }
    }

    /// Lab rendering of the master image, optionally cropped.
    pub fn lab_image(&self, crop: Option<Rect>) -> Result<LabImage> {
        let master = self.shared.master.read();
        let master = master.as_ref().ok_or_else(no_master)?;
        match crop {
            Some(rect) => xyz_to_lab_cropped(master, rect),
            None => xyz_to_lab(master),
        }
    }

    /// Spawns the worker. Fails if one is still running.
    #[instrument(skip(self))]
    pub fn start_async(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(ColorError::EngineState("worker already running".to_string()));
        }
        if let Err(e) = self.wait_for_thread_finish() {
            warn!(error = %e, "Previous run ended with an error");
        }

        let bands = self.band_count();
        let lights = self.light_count();
        if bands == 0 {
            return Err(ColorError::EngineState("no filters configured".to_string()));
        }
        self.calibration.check_complete(lights, bands)?;
        if self.config.register && self.targets.is_none() {
            return Err(ColorError::EngineState(
                "registration enabled but no targets set".to_string(),
            ));
        }

        self.shared
            .accumulators
            .write()
            .iter_mut()
            .for_each(XyzAccumulator::reset);
        *self.shared.master.write() = None;
        self.shared.cancel.store(false, Ordering::SeqCst);
        self.shared.processed.store(0, Ordering::SeqCst);

        let inputs = WorkerInputs {
            filters: Arc::clone(&self.filters),
            calibration: Arc::clone(&self.calibration),
            white_rect: self.white_rect,
            targets: self.targets,
            reference_white: self.config.reference_whites(bands),
            register: self.config.register,
            options: RegistrationOptions {
                binarize_targets: self.config.binarize_targets,
            },
            width: self.config.width,
            height: self.config.height,
            light_count: lights,
            archive: self.config.archive_path.clone().map(|path| ArchiveSettings {
                path,
                compression: self.config.archive_compression,
                capture: CaptureMetadata {
                    filter_count: bands as u32,
                    light_count: lights as u32,
                    illuminant: self.config.illuminant_name.clone(),
                    white_rect: self.white_rect,
                    ..CaptureMetadata::default()
                },
            }),
        };

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("color-engine".to_string())
            .spawn(move || run_worker(&shared, &inputs))?;
        self.worker = Some(handle);
        info!(bands, lights, "Color engine started");
        Ok(())
    }

    /// Cancels the worker, waits for it, then drops anything still queued.
    ///
    /// Returns the worker's report, or `None` if no worker was started.
    #[instrument(skip(self))]
    pub fn stop_async(&mut self) -> Result<Option<EngineReport>> {
        self.shared.cancel.store(true, Ordering::SeqCst);
        self.shared.queue.push(None);
        let report = self.finish_worker();
        info!("Color engine stopped");
        report
    }

    /// Blocks until the worker has consumed every expected frame.
    ///
    /// Frames still queued once the run is over belong to no run: they are
    /// dropped and counted in [`EngineReport::frames_discarded`]. Without a
    /// worker this returns `Ok(None)` and leaves the queue alone, so frames
    /// can be queued ahead of the next [`start_async`](Self::start_async).
    pub fn wait_for_thread_finish(&mut self) -> Result<Option<EngineReport>> {
        if self.worker.is_none() {
            return Ok(None);
        }
        self.finish_worker()
    }

    /// Joins the worker, then empties the queue.
    fn finish_worker(&mut self) -> Result<Option<EngineReport>> {
        let joined = self.join_worker();

        let discarded = self.shared.queue.drain().into_iter().flatten().count();
        if discarded > 0 {
            warn!(discarded, "Queued frames discarded");
        }

        let mut report = joined?;
        if let Some(report) = report.as_mut() {
            report.frames_discarded = discarded;
        }
        Ok(report)
    }

    fn join_worker(&mut self) -> Result<Option<EngineReport>> {
        let Some(handle) = self.worker.take() else {
            return Ok(None);
        };
        match handle.join() {
            Ok(result) => result.map(Some),
            Err(_) => Err(ColorError::WorkerPanicked),
        }
    }
}

impl Drop for ColorEngine {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.shared.cancel.store(true, Ordering::SeqCst);
            self.shared.queue.push(None);
            if let Err(e) = self.join_worker() {
                warn!(error = %e, "Worker failed during shutdown");
            }
        }
    }
}

fn no_master() -> ColorError {
    ColorError::EngineState("no master image yet".to_string())
}

fn run_worker(shared: &Shared, inputs: &WorkerInputs) -> Result<EngineReport> {
    let bands = inputs.filters.filter_count();
    let _span = info_span!("color_worker", bands, lights = inputs.light_count).entered();

    let mut report = EngineReport::default();
    let mut references: Vec<Option<Vec<f32>>> = vec![None; inputs.light_count];
    let mut archive = inputs.archive.as_ref().map(|settings| {
        let mut writer = TiffArchiveWriter::new(settings.capture.clone(), settings.compression);
        writer.register_custom_tags();
        writer
    });

    for band in 0..bands {
        for light in 0..inputs.light_count {
            let item = shared.queue.pop();
            let cancelled = shared.cancel.load(Ordering::SeqCst);
            let frame = match item {
                Some(frame) if !cancelled => frame,
                item => {
                    report.poison_received = item.is_none();
                    report.cancelled = true;
                    info!(processed = report.frames_processed, "Worker cancelled");
                    return Ok(report);
                }
            };

            let _frame_span = info_span!("frame", band, light).entered();
            process_frame(
                shared,
                inputs,
                &frame,
                band,
                light,
                &mut references,
                archive.as_mut(),
                &mut report,
            )?;
            report.frames_processed += 1;
            shared.processed.fetch_add(1, Ordering::SeqCst);
        }
    }

    let timer = Timer::start("fuse");
    let images = {
        let mut accumulators = shared.accumulators.write();
        for accumulator in accumulators.iter_mut() {
            accumulator.finalize()?;
        }
        accumulators
            .iter()
            .map(|a| a.image().clone())
            .collect::<Vec<_>>()
    };
    let master = fuse(&images, None)?;
    *shared.master.write() = Some(master);
    let (name, duration) = timer.stop();
    report.timings.add_step(name, duration);

    if let (Some(writer), Some(settings)) = (archive.as_mut(), inputs.archive.as_ref()) {
        let timer = Timer::start("archive");
        writer.write_archive_file(&settings.path)?;
        let (name, duration) = timer.stop();
        report.timings.add_step(name, duration);
    }

    report.timings.log_summary();
    info!(
        frames = report.frames_processed,
        guarded = report.guard.total(),
        "Master image ready"
    );
    Ok(report)
}

#[allow(clippy::too_many_arguments)]
fn process_frame(
    shared: &Shared,
    inputs: &WorkerInputs,
    frame: &RawFrame,
    band: usize,
    light: usize,
    references: &mut [Option<Vec<f32>>],
    archive: Option<&mut TiffArchiveWriter>,
    report: &mut EngineReport,
) -> Result<()> {
    let wavelength = inputs.filters.wavelength_at(band)?;
    let weights = inputs.filters.weights(wavelength)?;
    let reference = inputs.reference_white[band];

    let (mut calibrated, guard) = report
        .timings
        .time("calibrate", || inputs.calibration.calibrate_frame(frame, light, band))?;
    report.guard += guard;
    let plane = calibrated.plane_mut(0)?;

    let measured = match inputs.white_rect {
        Some(rect) => {
            let timer = Timer::start("normalize");
            let measured = median_in_rect(plane, inputs.width, rect)?;
            report.guard += normalize_plane(plane, measured, reference);
            let (name, duration) = timer.stop();
            report.timings.add_step(name, duration);
            Some(measured)
        }
        None => None,
    };
    report.whites.push(FrameWhite {
        band,
        light,
        wavelength,
        reference,
        measured,
    });

    if let (true, Some(targets)) = (inputs.register, inputs.targets.as_ref()) {
        if let Some(reference_plane) = references[light].as_deref() {
            let registration = report.timings.time("register", || {
                register_plane(
                    &mut *plane,
                    reference_plane,
                    inputs.width,
                    inputs.height,
                    targets,
                    &inputs.options,
                )
            })?;
            report.registrations.push(FrameRegistration {
                band,
                light,
                registration,
            });
        } else {
            // first band seen for this light becomes its registration reference
            references[light] = Some(plane.to_vec());
        }
    }

    if let Some(writer) = archive {
        writer.add_page(ArchivePage {
            width: inputs.width,
            height: inputs.height,
            data: plane.to_vec(),
            wavelength,
            light,
            reference_white: reference,
            measured_white: measured,
        })?;
    }

    let timer = Timer::start("integrate");
    {
        let mut accumulators = shared.accumulators.write();
        let count = accumulators.len();
        accumulators
            .get_mut(light)
            .ok_or(ColorError::OutOfRange { index: light, count })?
            .accumulate(plane, &weights)?;
    }
    let (name, duration) = timer.stop();
    report.timings.add_step(name, duration);
    debug!(band, light, wavelength, "Frame integrated");
    Ok(())
}
