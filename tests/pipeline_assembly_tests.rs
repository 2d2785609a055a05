//! Assembly and lifecycle tests for the detection pipeline
//!
//! These drive `DetectionPipeline` through the recording backend, so they
//! need neither the Hailo plugins nor a reachable camera.

use hailocam::pipeline::{
    BusEvent, DetectionPipeline, FrameworkState, MediaBackend, PipelineState, ProbeStatus,
    PropertyValue, RecordingBackend, StageKind,
};
use hailocam::{AppConfig, FrameStats, HailoCamError, HardwareVariant};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const STAGE_NAMES: [&str; 10] = [
    "source",
    "jpeg-decoder",
    "converter",
    "scaler",
    "capsfilter",
    "queue1",
    "hailonet",
    "hailofilter",
    "queue2",
    "sink",
];

fn install_with(files: &[&str]) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("resources")).unwrap();
    for file in files {
        fs::write(dir.path().join("resources").join(file), b"hef").unwrap();
    }
    dir
}

fn config(install: &TempDir, model: &str, hardware: HardwareVariant) -> AppConfig {
    let mut config = AppConfig::default();
    config.model.name = model.to_string();
    config.model.hardware = hardware;
    config.model.install_dir = Some(install.path().to_path_buf());
    config
}

fn count_frames(_buffer: &[u8], stats: &FrameStats) -> ProbeStatus {
    stats.record_frame();
    ProbeStatus::Ok
}

fn build(
    backend: &Arc<RecordingBackend>,
    config: &AppConfig,
) -> Result<(DetectionPipeline<RecordingBackend>, Arc<FrameStats>), HailoCamError> {
    let stats = Arc::new(FrameStats::default());
    let pipeline = DetectionPipeline::new(backend.clone(), config, count_frames, stats.clone())?;
    Ok((pipeline, stats))
}

mod model_resolution {
    use super::*;

    #[test]
    fn test_unknown_model_lists_available_names() {
        let install = install_with(&[]);
        let backend = Arc::new(RecordingBackend::new());

        let err = build(&backend, &config(&install, "yolov5m", HardwareVariant::Hailo8L))
            .err()
            .unwrap();

        match err {
            HailoCamError::Configuration { available, .. } => {
                assert_eq!(available, vec!["yolov8s", "yolov6n", "yolox_s"]);
            }
            other => panic!("Expected Configuration error, got {other:?}"),
        }
        assert!(backend.created().is_empty());
    }

    #[test]
    fn test_missing_hef_file() {
        let install = install_with(&["yolov8s.hef"]);
        let backend = Arc::new(RecordingBackend::new());

        let err = build(&backend, &config(&install, "yolov8s", HardwareVariant::Hailo8L))
            .err()
            .unwrap();

        match err {
            HailoCamError::ResourceNotFound(path) => {
                assert!(path.ends_with("resources/yolov8s_h8l.hef"));
            }
            other => panic!("Expected ResourceNotFound, got {other:?}"),
        }
        assert!(backend.created().is_empty());
    }

    #[test]
    fn test_hef_path_resolves_under_install_dir() {
        let install = install_with(&["yolov5m_wo_spp.hef"]);
        let backend = Arc::new(RecordingBackend::new());

        let (pipeline, _) =
            build(&backend, &config(&install, "yolov5m", HardwareVariant::Hailo8)).unwrap();

        assert_eq!(
            pipeline.hef_path(),
            install.path().join("resources/yolov5m_wo_spp.hef")
        );
        let expected = PropertyValue::Str(pipeline.hef_path().to_string_lossy().into_owned());
        assert!(backend
            .properties_of("hailonet")
            .contains(&("hef-path".to_string(), expected)));
    }
}

mod assembly {
    use super::*;

    #[test]
    fn test_ten_stages_linked_in_order() {
        let install = install_with(&["yolov5m_wo_spp.hef"]);
        let backend = Arc::new(RecordingBackend::new());
        let (pipeline, _) =
            build(&backend, &config(&install, "yolov5m", HardwareVariant::Hailo8)).unwrap();

        assert_eq!(pipeline.state(), PipelineState::Assembled);
        assert_eq!(pipeline.stages().len(), 10);

        let created: Vec<_> = backend.created().into_iter().map(|s| s.name).collect();
        assert_eq!(created, STAGE_NAMES);
        assert_eq!(backend.added(), STAGE_NAMES);

        let expected_links: Vec<_> = STAGE_NAMES
            .windows(2)
            .map(|pair| (pair[0].to_string(), pair[1].to_string()))
            .collect();
        assert_eq!(backend.links(), expected_links);

        let factories: Vec<_> = backend.created().into_iter().map(|s| s.factory).collect();
        assert_eq!(
            factories,
            vec![
                "souphttpsrc",
                "jpegdec",
                "videoconvert",
                "videoscale",
                "capsfilter",
                "queue",
                "hailonet",
                "hailofilter",
                "queue",
                "autovideosink"
            ]
        );
    }

    #[test]
    fn test_queue_caps_independent_of_model() {
        let cases = [
            ("yolov8m", "yolov8m.hef", HardwareVariant::Hailo8),
            ("yolox_s", "yolox_s_leaky_h8l_mz.hef", HardwareVariant::Hailo8L),
        ];

        for (model, file, hardware) in cases {
            let install = install_with(&[file]);
            let backend = Arc::new(RecordingBackend::new());
            let _pipeline = build(&backend, &config(&install, model, hardware)).unwrap();

            for queue in ["queue1", "queue2"] {
                assert_eq!(
                    backend.properties_of(queue),
                    vec![
                        ("max-size-buffers".to_string(), PropertyValue::UInt(10)),
                        ("max-size-time".to_string(), PropertyValue::UInt64(0)),
                        ("max-size-bytes".to_string(), PropertyValue::UInt(0)),
                    ]
                );
            }
        }
    }

    #[test]
    fn test_stage_properties() {
        let install = install_with(&["yolov5m_wo_spp.hef"]);
        let backend = Arc::new(RecordingBackend::new());
        let _pipeline =
            build(&backend, &config(&install, "yolov5m", HardwareVariant::Hailo8)).unwrap();

        let source = backend.properties_of("source");
        assert!(source.contains(&("timeout".to_string(), PropertyValue::UInt(5))));
        assert!(source.contains(&("retries".to_string(), PropertyValue::Int(3))));

        assert_eq!(
            backend.properties_of("capsfilter"),
            vec![(
                "caps".to_string(),
                PropertyValue::Caps("video/x-raw,format=RGB,width=640,height=480".to_string())
            )]
        );
        assert!(backend
            .properties_of("hailonet")
            .contains(&("batch-size".to_string(), PropertyValue::UInt(1))));
        assert_eq!(
            backend.properties_of("sink"),
            vec![("sync".to_string(), PropertyValue::Bool(false))]
        );
    }

    #[test]
    fn test_probe_and_observers_registered() {
        let install = install_with(&["yolov5m_wo_spp.hef"]);
        let backend = Arc::new(RecordingBackend::new());
        let (_pipeline, stats) =
            build(&backend, &config(&install, "yolov5m", HardwareVariant::Hailo8)).unwrap();

        assert_eq!(backend.probe_targets(), vec!["hailofilter".to_string()]);
        assert_eq!(backend.observer_count(), 2);

        assert_eq!(backend.push_buffer(&[1, 2, 3]), vec![ProbeStatus::Ok]);
        assert_eq!(stats.frame_count(), 1);
    }

    #[test]
    fn test_missing_plugin_fails_fast() {
        let install = install_with(&["yolov5m_wo_spp.hef"]);
        let backend = Arc::new(RecordingBackend::new().fail_stage_creation(StageKind::Inference));

        let err = build(&backend, &config(&install, "yolov5m", HardwareVariant::Hailo8))
            .err()
            .unwrap();

        match err {
            HailoCamError::StageCreation { stage, factory, .. } => {
                assert_eq!(stage, "hailonet");
                assert_eq!(factory, "hailonet");
            }
            other => panic!("Expected StageCreation, got {other:?}"),
        }
        assert_eq!(backend.created().len(), 6);
        assert!(backend.added().is_empty());
        assert!(backend.links().is_empty());
    }

    #[test]
    fn test_link_failure_is_not_rolled_back() {
        let install = install_with(&["yolov5m_wo_spp.hef"]);
        let backend = Arc::new(RecordingBackend::new().fail_link_from(StageKind::IngressQueue));

        let err = build(&backend, &config(&install, "yolov5m", HardwareVariant::Hailo8))
            .err()
            .unwrap();

        match err {
            HailoCamError::Link {
                upstream,
                downstream,
                ..
            } => {
                assert_eq!(upstream, "queue1");
                assert_eq!(downstream, "hailonet");
            }
            other => panic!("Expected Link error, got {other:?}"),
        }
        assert_eq!(backend.links().len(), 5);
        assert!(backend.probe_targets().is_empty());
        assert!(backend.states().is_empty());
    }
}

mod lifecycle {
    use super::*;

    fn assembled() -> (
        TempDir,
        Arc<RecordingBackend>,
        DetectionPipeline<RecordingBackend>,
        Arc<FrameStats>,
    ) {
        let install = install_with(&["yolov5m_wo_spp.hef"]);
        let backend = Arc::new(RecordingBackend::new());
        let (pipeline, stats) =
            build(&backend, &config(&install, "yolov5m", HardwareVariant::Hailo8)).unwrap();
        (install, backend, pipeline, stats)
    }

    #[test]
    fn test_end_of_stream_stops_pipeline() {
        let (_install, backend, pipeline, stats) = assembled();
        backend.script_buffer(&[0u8; 8]);
        backend.script_buffer(&[0u8; 8]);
        backend.script_event(BusEvent::EndOfStream);

        assert!(pipeline.run().is_ok());

        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert_eq!(stats.frame_count(), 2);
        assert_eq!(
            backend.states(),
            vec![FrameworkState::Playing, FrameworkState::Null]
        );
        assert!(pipeline.take_runtime_error().is_none());
    }

    #[test]
    fn test_bus_error_stops_without_raising() {
        let (_install, backend, pipeline, _stats) = assembled();
        backend.script_event(BusEvent::Error {
            source: Some("/ipcam-detection-pipeline/source".to_string()),
            message: "Could not connect to server".to_string(),
            debug: Some("souphttpsrc: connection refused".to_string()),
        });
        // Never delivered: the error ends the loop first
        backend.script_event(BusEvent::EndOfStream);

        assert!(pipeline.run().is_ok());

        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert_eq!(
            backend.states(),
            vec![FrameworkState::Playing, FrameworkState::Null]
        );
        match pipeline.take_runtime_error() {
            Some(HailoCamError::RuntimeObserved { message, debug }) => {
                assert_eq!(message, "Could not connect to server");
                assert_eq!(debug.as_deref(), Some("souphttpsrc: connection refused"));
            }
            other => panic!("Expected RuntimeObserved, got {other:?}"),
        }
    }

    #[test]
    fn test_warnings_do_not_stop_pipeline() {
        let (_install, backend, pipeline, _stats) = assembled();
        backend.script_event(BusEvent::Warning {
            source: None,
            message: "Can't record audio fast enough".to_string(),
            debug: None,
        });
        backend.script_event(BusEvent::StateChanged {
            old: "Paused".to_string(),
            new: "Playing".to_string(),
        });

        // Script runs dry without a quit; the run still ends in cleanup
        assert!(pipeline.run().is_ok());
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert!(pipeline.take_runtime_error().is_none());
    }

    #[test]
    fn test_quit_before_run_ends_run_at_once() {
        let (_install, backend, pipeline, stats) = assembled();
        backend.script_buffer(&[0u8; 8]);
        backend.script_event(BusEvent::EndOfStream);

        backend.quit_loop();
        assert!(pipeline.run().is_ok());

        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert_eq!(stats.frame_count(), 0);
        assert_eq!(
            backend.states(),
            vec![FrameworkState::Playing, FrameworkState::Null]
        );
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let (_install, backend, pipeline, _stats) = assembled();

        pipeline.cleanup();
        assert_eq!(pipeline.state(), PipelineState::Stopped);

        pipeline.cleanup();
        pipeline.cleanup();
        assert_eq!(backend.states(), vec![FrameworkState::Null]);
    }

    #[test]
    fn test_callback_receives_user_data() {
        let install = install_with(&["yolov5m_wo_spp.hef"]);
        let backend = Arc::new(RecordingBackend::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let _pipeline = DetectionPipeline::new(
            backend.clone(),
            &config(&install, "yolov5m", HardwareVariant::Hailo8),
            |buffer: &[u8], seen: &AtomicUsize| {
                seen.fetch_add(buffer.len(), Ordering::SeqCst);
                ProbeStatus::Pass
            },
            counter.clone(),
        )
        .unwrap();

        assert_eq!(backend.push_buffer(&[0u8; 5]), vec![ProbeStatus::Pass]);
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }
}
