//! Pipeline orchestrator - coordinates ingestion, segmentation, mark
//! generation and timing-map building for one session.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use contracts::isotime::format_isotime;
use contracts::{Clock, ContractError, IdSequence, Mark, TimingConfig, TimingMapAnchor};
use ingestion::{find_study_range, load_events, load_timing_map, SessionLayout, StudyRange};
use observability::record_stage_duration;
use sync_engine::{DomainInputs, MarkGenerator, Segmenter, TimingMapBuilder, TimingMapService};
use tracing::{info, instrument, warn};

use super::PipelineStats;

/// Where the study range comes from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RangeSource {
    /// No filtering
    #[default]
    None,
    /// Explicit bounds expressed in `clock`
    Explicit { range: StudyRange, clock: Clock },
    /// StudyRecord with this name in the dicoms dump (dicoms clock)
    Study { name: String },
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub timing: TimingConfig,
    pub layout: SessionLayout,
    pub range: RangeSource,
    /// Timing map used for conversions before a new one is built
    pub tmap_in: Option<PathBuf>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
    ids: IdSequence,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let stats = PipelineStats::new(config.layout.session_id());
        Self {
            config,
            ids: IdSequence::new(),
            stats,
        }
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn into_stats(self) -> PipelineStats {
        self.stats
    }

    /// Conversion service for the mark stage: a previous timing map if given,
    /// otherwise calibration only.
    fn bootstrap_service(&self) -> Result<TimingMapService> {
        let anchors = match &self.config.tmap_in {
            Some(path) => {
                let (anchors, _) = load_timing_map(path)
                    .with_context(|| format!("Failed to load timing map {}", path.display()))?;
                anchors
            }
            None => Vec::new(),
        };
        let service = TimingMapService::from_config(anchors, &self.config.timing);
        info!(tmap = %service.to_label(), "Conversion service ready");
        Ok(service)
    }

    /// Resolve the study range and the clock it is expressed in
    fn study_range(&self) -> Result<Option<(StudyRange, Clock)>> {
        match &self.config.range {
            RangeSource::None => Ok(None),
            RangeSource::Explicit { range, clock } => Ok(Some((*range, *clock))),
            RangeSource::Study { name } => {
                let path = self.config.layout.events_path(Clock::Dicoms);
                let found = find_study_range(&path, Some(name), self.config.timing.timezone)
                    .with_context(|| {
                        format!("Failed to read study range from {}", path.display())
                    })?;
                match found {
                    Some(range) => Ok(Some((range, Clock::Dicoms))),
                    None => {
                        warn!(
                            study = %name,
                            path = %path.display(),
                            "Study record not found, not filtering"
                        );
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Load, range-filter and segment every configured clock.
    ///
    /// A missing dump is fatal for the reference clock and skipped with a
    /// warning for any other clock.
    #[instrument(name = "pipeline_load_inputs", skip_all)]
    pub fn load_inputs(&mut self, service: &TimingMapService) -> Result<DomainInputs> {
        let started = Instant::now();
        let timing = &self.config.timing;
        let range = self.study_range()?;
        let segmenter = Segmenter::new(&timing.segmenter, service);
        let mut inputs = DomainInputs::default();

        for clock in timing.clocks.iter().copied() {
            let path = self.config.layout.events_path(clock);
            let (stream, read) = match load_events(&path, clock, timing.timezone) {
                Ok(loaded) => loaded,
                Err(ContractError::MissingFile { path }) if clock != timing.reference_clock => {
                    warn!(
                        clock = %clock,
                        path = %path.display(),
                        "No event dump for clock, skipping"
                    );
                    continue;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to load {clock} events"));
                }
            };

            let mut events = stream.events;
            let mut out_of_range = 0;
            if let Some((range, range_clock)) = &range {
                match range.map(|t| service.convert(*range_clock, clock, Some(t))) {
                    Some(domain_range) => {
                        out_of_range = domain_range.retain(&mut events);
                        info!(
                            clock = %clock,
                            start = %format_isotime(&domain_range.start),
                            end = %format_isotime(&domain_range.end),
                            dropped = out_of_range,
                            "Applied study range"
                        );
                    }
                    None => warn!(clock = %clock, "Study range not convertible, not filtering"),
                }
            }
            self.stats.summary.record_events(clock, events.len(), read.malformed, out_of_range);

            let (series, seg) = segmenter.segment(clock, &events);
            self.stats.summary.record_series(clock, seg.series, seg.discarded);
            inputs.series.insert(clock.canonical(), series);
            inputs.events.insert(clock.canonical(), events);
        }

        self.stats.record_stage("ingest", started);
        Ok(inputs)
    }

    /// Events to marks
    #[instrument(
        name = "pipeline_generate_marks",
        skip_all,
        fields(session = ?self.config.layout.session_id())
    )]
    pub fn generate_marks(&mut self) -> Result<Vec<Mark>> {
        let service = self.bootstrap_service()?;
        let inputs = self.load_inputs(&service)?;

        let started = Instant::now();
        let generator = MarkGenerator::new(&self.config.timing, &service)
            .with_session_id(self.config.layout.session_id());
        let (marks, mark_stats) = generator
            .generate(&inputs, &mut self.ids)
            .context("Mark generation failed")?;

        let summary = &mut self.stats.summary;
        summary.reference_series += mark_stats.reference_series as u64;
        for (kind, count) in &mark_stats.by_kind {
            summary.record_marks(*kind, *count);
        }
        for (clock, matched) in &mark_stats.matched {
            summary.record_matched(*clock, *matched);
        }
        self.stats.record_stage("marks", started);

        info!(marks = marks.len(), loose_filled = mark_stats.loose_filled, "Marks generated");
        Ok(marks)
    }

    /// Marks to timing map
    #[instrument(name = "pipeline_build_timing_map", skip_all, fields(marks = marks.len()))]
    pub fn build_timing_map(&mut self, marks: &[Mark]) -> Result<Vec<TimingMapAnchor>> {
        let started = Instant::now();
        let (anchors, build) = TimingMapBuilder::new(&self.config.timing)
            .build(marks)
            .context("Timing map build failed")?;

        self.stats
            .summary
            .record_anchors(&anchors, self.config.timing.reference_clock);
        self.stats.record_stage("tmap", started);

        info!(
            anchors = build.anchors,
            synthesized = build.synthesized,
            unresolved = build.unresolved,
            "Timing map built"
        );
        Ok(anchors)
    }

    pub fn record_written(&mut self, records: u64) {
        self.stats.summary.record_written(records);
    }
}

impl PipelineStats {
    fn record_stage(&mut self, stage: &'static str, started: Instant) {
        let elapsed = started.elapsed();
        record_stage_duration(stage, elapsed.as_secs_f64());
        self.stages.push((stage, elapsed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::isotime::{parse_isotime, shift};
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;

    const T0: &str = "2024-06-04T13:54:19.385115";

    fn write_dump(dir: &Path, clock: &str, offset: f64, series: &[(f64, usize)]) {
        let t0 = parse_isotime(T0).unwrap();
        let mut file = fs::File::create(dir.join(format!("dump_{clock}.jsonl"))).unwrap();
        let mut n = 0;
        for (start, count) in series {
            for i in 0..*count {
                n += 1;
                let t = shift(t0, offset + start + i as f64 * 2.0);
                writeln!(
                    file,
                    r#"{{"id":"{clock}_{n:06}","isotime":"{}"}}"#,
                    format_isotime(&t)
                )
                .unwrap();
            }
        }
    }

    fn session() -> (TempDir, SessionLayout) {
        let root = TempDir::new().unwrap();
        let session = root.path().join("ses-20240604");
        let dumps = session.join("timing-dumps");
        fs::create_dir_all(&dumps).unwrap();
        let series = [(0.0, 8), (60.0, 6)];
        write_dump(&dumps, "birch", 0.0, &series);
        write_dump(&dumps, "dicoms", 30.5, &series);
        write_dump(&dumps, "psychopy", -0.015226, &series);
        let layout = SessionLayout::open(&session).unwrap();
        (root, layout)
    }

    fn pipeline(layout: SessionLayout) -> Pipeline {
        Pipeline::new(PipelineConfig {
            timing: TimingConfig::default(),
            layout,
            range: RangeSource::None,
            tmap_in: None,
        })
    }

    #[test]
    fn test_marks_and_map_for_session() {
        let (_root, layout) = session();
        let mut pipeline = pipeline(layout);

        let marks = pipeline.generate_marks().unwrap();
        // (start + 8 scans + end) + (start + 6 scans + end)
        assert_eq!(marks.len(), 18);
        assert_eq!(marks[0].session_id.as_deref(), Some("ses-20240604"));
        assert!(marks[0].has_clock(Clock::Dicoms));
        assert!(!marks[0].has_clock(Clock::Qrinfo));

        // qrinfo has no dump, so strict selection needs it skip-set
        pipeline.config.timing.skip_clocks = vec![Clock::Qrinfo];
        let anchors = pipeline.build_timing_map(&marks).unwrap();
        assert_eq!(anchors.len(), 18);
        let dicoms = anchors[0].offset(Clock::Dicoms).unwrap();
        assert!((dicoms - 30.5).abs() < 1e-5);
        // never observed, so nothing to synthesize from
        assert!(anchors.iter().all(|a| a.offset(Clock::Qrinfo).is_none()));
        assert!(anchors.iter().all(|a| a.clock_isotime(Clock::Qrinfo).is_none()));

        let stats = pipeline.into_stats();
        assert_eq!(stats.summary.clocks[&Clock::Birch].series, 2);
        assert_eq!(stats.summary.clocks[&Clock::Dicoms].matched, 2);
        assert_eq!(stats.summary.total_marks(), 18);
        assert_eq!(stats.stages.len(), 3);
    }

    #[test]
    fn test_explicit_range_drops_second_series() {
        let (_root, layout) = session();
        let t0 = parse_isotime(T0).unwrap();
        let mut pipeline = Pipeline::new(PipelineConfig {
            timing: TimingConfig::default(),
            layout,
            range: RangeSource::Explicit {
                range: StudyRange::new(shift(t0, -1.0), shift(t0, 30.0)),
                clock: Clock::Birch,
            },
            tmap_in: None,
        });

        let marks = pipeline.generate_marks().unwrap();
        assert_eq!(marks.len(), 10);
        assert_eq!(pipeline.stats().summary.clocks[&Clock::Birch].out_of_range, 6);
    }

    #[test]
    fn test_missing_reference_dump_is_fatal() {
        let (_root, layout) = session();
        fs::remove_file(layout.events_path(Clock::Birch)).unwrap();
        let mut pipeline = pipeline(layout);
        assert!(pipeline.generate_marks().is_err());
    }
}
