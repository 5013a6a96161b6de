//! End-to-end tests across crates: synthetic session dumps go through
//! ingestion, segmentation, matching, mark generation and timing-map
//! building, then the persisted map is reloaded and used for conversions.

#[cfg(test)]
mod e2e_tests {
    use std::fs;
    use std::io::Write;
    use std::path::Path;

    use chrono::NaiveDateTime;
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::isotime::{format_isotime, parse_isotime, seconds_between, shift};
    use contracts::{
        Clock, ContractError, IdSequence, Mark, MarkKind, TimingConfig, TimingMapAnchor,
    };
    use dispatcher::{create_dispatcher, SinkTarget};
    use ingestion::{find_study_range, load_events, load_marks, load_timing_map, SessionLayout};
    use observability::RunSummary;
    use serde::Serialize;
    use sync_engine::{DomainInputs, MarkGenerator, Segmenter, TimingMapBuilder, TimingMapService};
    use tempfile::TempDir;

    const T0: &str = "2024-06-04T13:54:19.385115";
    const DICOMS_OFFSET: f64 = 372.122385;
    const QRINFO_OFFSET: f64 = 0.317885;
    const PSYCHOPY_OFFSET: f64 = -0.015226;

    /// Two scanner runs: 10 volumes at t0, 6 volumes 100 s later, TR 2 s
    const SERIES: [(f64, usize); 2] = [(0.0, 10), (100.0, 6)];

    const CONFIG: &str = r#"
reference_clock = "birch"
clocks = ["birch", "dicoms", "qrinfo", "psychopy"]

[manual_offsets]
dicoms = 372.122385
"#;

    fn t0() -> NaiveDateTime {
        parse_isotime(T0).unwrap()
    }

    fn write_dump(dir: &Path, clock: &str, offset: f64, extra: &[&str]) {
        let mut file = fs::File::create(dir.join(format!("dump_{clock}.jsonl"))).unwrap();
        for line in extra {
            writeln!(file, "{line}").unwrap();
        }
        let mut n = 0;
        for (start, count) in SERIES {
            for i in 0..count {
                n += 1;
                let t = shift(t0(), offset + start + i as f64 * 2.0);
                writeln!(
                    file,
                    r#"{{"id":"{clock}_{n:06}","isotime":"{}"}}"#,
                    format_isotime(&t)
                )
                .unwrap();
            }
        }
    }

    fn session(dicoms_extra: &[&str]) -> (TempDir, SessionLayout) {
        let root = TempDir::new().unwrap();
        let session = root.path().join("ses-20240604");
        let dumps = session.join("timing-dumps");
        fs::create_dir_all(&dumps).unwrap();
        write_dump(&dumps, "birch", 0.0, &[]);
        write_dump(&dumps, "dicoms", DICOMS_OFFSET, dicoms_extra);
        write_dump(&dumps, "qrinfo", QRINFO_OFFSET, &["not json at all"]);
        write_dump(&dumps, "psychopy", PSYCHOPY_OFFSET, &[]);
        let layout = SessionLayout::open(&session).unwrap();
        (root, layout)
    }

    fn config() -> TimingConfig {
        ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap()
    }

    fn segment_all(
        layout: &SessionLayout,
        config: &TimingConfig,
        service: &TimingMapService,
    ) -> DomainInputs {
        let segmenter = Segmenter::new(&config.segmenter, service);
        let mut inputs = DomainInputs::default();
        for clock in config.clocks.iter().copied() {
            let path = layout.events_path(clock);
            let (stream, _) = load_events(&path, clock, config.timezone).unwrap();
            let (series, _) = segmenter.segment(clock, &stream.events);
            inputs.series.insert(clock.canonical(), series);
            inputs.events.insert(clock.canonical(), stream.events);
        }
        inputs
    }

    fn generate(layout: &SessionLayout, config: &TimingConfig) -> Vec<Mark> {
        let service = TimingMapService::from_config(Vec::new(), config);
        let inputs = segment_all(layout, config, &service);
        let (marks, _) = MarkGenerator::new(config, &service)
            .with_session_id(layout.session_id())
            .generate(&inputs, &mut IdSequence::new())
            .unwrap();
        marks
    }

    fn persist<T: Serialize>(path: &Path, records: &[T]) {
        let mut dispatcher =
            create_dispatcher("e2e", &[SinkTarget::File(path.to_path_buf())]).unwrap();
        assert_eq!(dispatcher.dispatch(records).unwrap(), records.len());
        let metrics = dispatcher.finish().unwrap();
        assert_eq!(metrics[0].1.write_count, records.len() as u64);
    }

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() < tolerance,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_session_to_timing_map_and_back() {
        let (_root, layout) = session(&[]);
        let config = config();

        let marks = generate(&layout, &config);
        // (start + 10 scans + end) + (start + 6 scans + end)
        assert_eq!(marks.len(), 20);
        assert!(marks.iter().all(|m| m.session_id.as_deref() == Some("ses-20240604")));
        assert!(marks
            .iter()
            .all(|m| config.clocks.iter().all(|c| m.has_clock(*c))));
        assert_eq!(marks.iter().filter(|m| m.kind == MarkKind::Start).count(), 2);

        persist(&layout.marks_path(), &marks);
        let (reloaded, stats) = load_marks(&layout.marks_path()).unwrap();
        assert_eq!(stats.malformed, 0);
        assert_eq!(reloaded.len(), marks.len());
        for (a, b) in marks.iter().zip(&reloaded) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.isotime(Clock::Dicoms), b.isotime(Clock::Dicoms));
        }

        let (anchors, build) = TimingMapBuilder::new(&config).build(&reloaded).unwrap();
        assert_eq!(anchors.len(), 20);
        assert_eq!(build.anchors, 20);
        assert_eq!(anchors[0].isotime, t0());
        for anchor in &anchors {
            assert_eq!(anchor.offset(Clock::Birch), Some(0.0));
            assert_close(anchor.offset(Clock::Dicoms).unwrap(), DICOMS_OFFSET, 1e-5);
            assert_close(anchor.offset(Clock::Qrinfo).unwrap(), QRINFO_OFFSET, 1e-5);
            assert_close(anchor.offset(Clock::Psychopy).unwrap(), PSYCHOPY_OFFSET, 1e-5);
        }

        persist(&layout.tmap_path(), &anchors);
        let (tmap, _) = load_timing_map(&layout.tmap_path()).unwrap();
        assert_eq!(tmap.len(), anchors.len());

        let mut summary = RunSummary::new(layout.session_id());
        summary.record_anchors(&tmap, config.reference_clock);
        assert_eq!(summary.anchors, 20);
        assert_eq!(summary.offsets[&Clock::Dicoms].count(), 20);
    }

    #[test]
    fn test_conversions_through_reloaded_map() {
        let (_root, layout) = session(&[]);
        let config = config();
        let marks = generate(&layout, &config);
        let (anchors, _) = TimingMapBuilder::new(&config).build(&marks).unwrap();
        persist(&layout.tmap_path(), &anchors);

        let (tmap, _) = load_timing_map(&layout.tmap_path()).unwrap();
        let service = TimingMapService::from_config(tmap, &config);

        // calibrated dicoms time maps straight back onto the reference axis
        let dicoms = parse_isotime("2024-06-04T14:00:31.5075").unwrap();
        let birch = service.convert(Clock::Dicoms, Clock::Birch, Some(dicoms)).unwrap();
        assert_close(seconds_between(t0(), birch), 0.0, 1e-6);

        let psychopy = service.convert(Clock::Birch, Clock::Psychopy, Some(t0())).unwrap();
        assert_close(seconds_between(t0(), psychopy), PSYCHOPY_OFFSET, 1e-5);

        let t = shift(t0(), 50.0);
        let there = service.convert(Clock::Birch, Clock::Psychopy, Some(t));
        let back = service.convert(Clock::Psychopy, Clock::Birch, there).unwrap();
        assert_close(seconds_between(t, back), 0.0, 1e-6);

        assert_eq!(service.convert(Clock::Qrinfo, Clock::Qrinfo, Some(t)), Some(t));
        assert_eq!(service.convert(Clock::Dicoms, Clock::Birch, None), None);

        let anchor: &TimingMapAnchor = service.find_anchor(shift(t0(), 50.0)).unwrap();
        assert_eq!(anchor.isotime, shift(t0(), 18.0));
        assert_eq!(service.find_anchor(shift(t0(), -5.0)).unwrap().isotime, t0());
    }

    #[test]
    fn test_study_record_limits_marks_to_first_run() {
        let start = format_isotime(&shift(t0(), DICOMS_OFFSET - 1.0));
        let end = format_isotime(&shift(t0(), DICOMS_OFFSET + 30.0));
        let record = format!(
            concat!(
                r#"{{"type":"StudyRecord","name":"dbic^QA","#,
                r#""range_isotime_start":"{start}","range_isotime_end":"{end}"}}"#
            ),
            start = start,
            end = end
        );
        let (_root, layout) = session(&[record.as_str()]);
        let config = config();
        let service = TimingMapService::from_config(Vec::new(), &config);

        let dicoms = layout.events_path(Clock::Dicoms);
        let range = find_study_range(&dicoms, Some("dbic^QA"), config.timezone)
            .unwrap()
            .unwrap();

        let segmenter = Segmenter::new(&config.segmenter, &service);
        let mut inputs = DomainInputs::default();
        for clock in config.clocks.iter().copied() {
            let path = layout.events_path(clock);
            let (stream, _) = load_events(&path, clock, config.timezone).unwrap();
            let mut events = stream.events;
            let domain_range = range
                .map(|t| service.convert(Clock::Dicoms, clock, Some(t)))
                .unwrap();
            assert_eq!(domain_range.retain(&mut events), 6);
            let (series, _) = segmenter.segment(clock, &events);
            inputs.series.insert(clock.canonical(), series);
            inputs.events.insert(clock.canonical(), events);
        }

        let (marks, stats) = MarkGenerator::new(&config, &service)
            .generate(&inputs, &mut IdSequence::new())
            .unwrap();
        assert_eq!(marks.len(), 12);
        assert_eq!(stats.reference_series, 1);
    }

    #[test]
    fn test_utc_stamped_reference_lines_up_with_local_clocks() {
        let (_root, layout) = session(&[]);
        let path = layout.events_path(Clock::Birch);
        let utc: String = fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(|line| {
                let mut value: serde_json::Value = serde_json::from_str(line).unwrap();
                let local = parse_isotime(value["isotime"].as_str().unwrap()).unwrap();
                // New York is UTC-4 in June
                let stamped = format!("{}Z", format_isotime(&shift(local, 4.0 * 3600.0)));
                value["isotime"] = stamped.into();
                format!("{value}\n")
            })
            .collect();
        fs::write(&path, utc).unwrap();

        let config = config();
        let marks = generate(&layout, &config);
        assert_eq!(marks.len(), 20);
        assert_eq!(marks[0].isotime(Clock::Birch), Some(t0()));
        assert!(marks.iter().all(|m| m.has_clock(Clock::Psychopy)));
    }

    #[test]
    fn test_missing_reference_series_is_an_error() {
        let (_root, layout) = session(&[]);
        let config = config();
        let service = TimingMapService::from_config(Vec::new(), &config);
        let mut inputs = segment_all(&layout, &config, &service);
        inputs.series.remove(&Clock::Birch);

        let result =
            MarkGenerator::new(&config, &service).generate(&inputs, &mut IdSequence::new());
        assert!(matches!(result, Err(ContractError::MissingData { .. })));
    }

    #[test]
    fn test_unmatched_clock_needs_skip_set_for_strict_map() {
        let (_root, layout) = session(&[]);
        // without calibration the dicoms start is far outside every threshold
        let mut config = config();
        config.manual_offsets.clear();

        let marks = generate(&layout, &config);
        assert!(marks.iter().all(|m| !m.has_clock(Clock::Dicoms)));
        assert!(TimingMapBuilder::new(&config).build(&marks).is_err());

        config.skip_clocks = vec![Clock::Dicoms];
        let (anchors, build) = TimingMapBuilder::new(&config).build(&marks).unwrap();
        assert_eq!(anchors.len(), marks.len());
        assert!(build.unresolved > 0);
        assert_close(anchors[0].offset(Clock::Psychopy).unwrap(), PSYCHOPY_OFFSET, 1e-5);
    }
}

#[cfg(test)]
mod contract_tests {
    use std::fs;
    use std::path::Path;
    use config_loader::ConfigLoader;
    use contracts::{AnchorSelection, Clock, ConversionMode, MarkKind, TimingConfig};

    #[test]
    fn test_default_config_is_valid() {
        let config = TimingConfig::default();
        assert!(ConfigLoader::validate(&config).is_ok());
        assert_eq!(config.reference_clock, Clock::Birch);
        assert_eq!(config.timing_map.selection, AnchorSelection::Strict);
        assert_eq!(config.conversion.mode, ConversionMode::Hold);
        assert_eq!(config.timing_map.anchor_kinds, MarkKind::ALL.to_vec());
    }

    #[test]
    fn test_config_survives_toml_rendering() {
        let mut config = TimingConfig::default();
        config.skip_clocks = vec![Clock::Qrinfo];
        config.manual_offsets.insert(Clock::Dicoms, 372.122385);

        let rendered = ConfigLoader::to_toml(&config).unwrap();
        let parsed =
            ConfigLoader::load_from_str(&rendered, config_loader::ConfigFormat::Toml).unwrap();
        assert_eq!(parsed, config);
    }

    fn rust_sources(dir: &Path, found: &mut Vec<std::path::PathBuf>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() && !path.ends_with("target") {
                rust_sources(&path, found);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                found.push(path);
            }
        }
    }

    #[test]
    fn test_sources_fit_line_width() {
        let crates = Path::new(env!("CARGO_MANIFEST_DIR")).parent().unwrap();
        let mut sources = Vec::new();
        rust_sources(crates, &mut sources);
        assert!(sources.len() > 20);

        let mut long = Vec::new();
        for path in &sources {
            let text = fs::read_to_string(path).unwrap();
            for (i, line) in text.lines().enumerate() {
                if line.chars().count() > 100 {
                    long.push(format!("{}:{}", path.display(), i + 1));
                }
            }
        }
        assert!(long.is_empty(), "lines over 100 columns: {long:?}");
    }
}
