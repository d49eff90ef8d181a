mod common;

use common::{video_file, Call, Event, FakeEngine, Recorder, CORRUPT};
use gifbatch::{
    encode_args, palette_args, BlobStore, Converter, EngineError, FileStatus, GifOptions,
    NoopObserver, SelectedFile, Session,
};
use pretty_assertions::assert_eq;

fn session_with(files: Vec<SelectedFile>) -> Session<FakeEngine> {
    gifbatch::logging::initialize_for_tests();
    let mut session = Session::new(FakeEngine::loaded(), GifOptions::default());
    session.select_files(files);
    session
}

#[test]
fn single_file_completes_with_output() {
    let dir = tempfile::tempdir().unwrap();
    let clip = video_file(dir.path(), "clip.mp4", &vec![7u8; 5 * 1024 * 1024]);
    let mut session = session_with(vec![clip]);

    let results = session.convert(&mut NoopObserver).unwrap().to_vec();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].file_name, "clip.mp4");
    assert_eq!(results[0].original_size, 5 * 1024 * 1024);
    assert!(results[0].output_size.unwrap() > 0);
    assert_eq!(results[0].download_name(), "clip.gif");
    let bytes = session.results().bytes(&results[0]).unwrap();
    assert!(bytes.starts_with(b"GIF89a"));

    assert_eq!(session.progress()[0].status, FileStatus::Completed);
    assert_eq!(session.progress()[0].progress, 100);
}

#[test]
fn a_failing_file_does_not_stop_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_with(vec![
        video_file(dir.path(), "one.mp4", b"first"),
        video_file(dir.path(), "two.mp4", CORRUPT),
        video_file(dir.path(), "three.mp4", b"third"),
    ]);

    let names: Vec<String> = session
        .convert(&mut NoopObserver)
        .unwrap()
        .iter()
        .map(|r| r.file_name.clone())
        .collect();

    assert_eq!(names, vec!["one.mp4", "three.mp4"]);
    let statuses: Vec<FileStatus> = session.progress().iter().map(|p| p.status).collect();
    assert_eq!(
        statuses,
        vec![FileStatus::Completed, FileStatus::Failed, FileStatus::Completed]
    );
    assert_eq!(session.failed_count(), 1);
}

#[test]
fn unreadable_input_fails_only_that_file() {
    let dir = tempfile::tempdir().unwrap();
    let gone = SelectedFile::new(dir.path().join("gone.mp4"), 10, Some("video/mp4"));
    let mut session = session_with(vec![gone, video_file(dir.path(), "ok.mp4", b"fine")]);

    session.convert(&mut NoopObserver).unwrap();

    assert_eq!(session.progress()[0].status, FileStatus::Failed);
    assert_eq!(session.progress()[1].status, FileStatus::Completed);
    let writes = session
        .engine()
        .calls
        .iter()
        .filter(|c| matches!(c, Call::Write(_)))
        .count();
    assert_eq!(writes, 1);
}

#[test]
fn empty_batch_touches_nothing() {
    let mut converter = Converter::new(FakeEngine::loaded(), GifOptions::default());
    let mut blobs = BlobStore::new();
    let mut recorder = Recorder::default();

    let results = converter.convert(&[], &mut blobs, &mut recorder).unwrap();

    assert!(results.is_empty());
    assert!(converter.engine().calls.is_empty());
    assert!(recorder.events.is_empty());
    assert!(blobs.is_empty());

    let mut session = Session::new(FakeEngine::new(), GifOptions::default());
    assert!(session.convert(&mut recorder).unwrap().is_empty());
}

#[test]
fn unloaded_engine_is_rejected_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let files = vec![video_file(dir.path(), "clip.mp4", b"video")];
    let mut converter = Converter::new(FakeEngine::new(), GifOptions::default());
    let mut recorder = Recorder::default();

    let err = converter
        .convert(&files, &mut BlobStore::new(), &mut recorder)
        .unwrap_err();

    assert!(matches!(err, EngineError::NotLoaded));
    assert!(recorder.events.is_empty());
    assert!(converter.engine().calls.is_empty());
}

#[test]
fn failed_load_leaves_session_unloaded() {
    let mut session = Session::new(FakeEngine::failing_load(), GifOptions::default());
    assert!(matches!(session.load(), Err(EngineError::Init(_))));
    assert!(!session.is_loaded());

    let dir = tempfile::tempdir().unwrap();
    session.select_files(vec![video_file(dir.path(), "clip.mp4", b"video")]);
    assert!(matches!(
        session.convert(&mut NoopObserver),
        Err(EngineError::NotLoaded)
    ));
    assert_eq!(session.progress()[0].status, FileStatus::Pending);
}

#[test]
fn statuses_follow_the_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_with(vec![
        video_file(dir.path(), "a.mp4", b"a"),
        video_file(dir.path(), "b.mp4", CORRUPT),
    ]);
    let mut recorder = Recorder::default();

    session.convert(&mut recorder).unwrap();

    assert_eq!(
        recorder.statuses(0),
        vec![FileStatus::Converting, FileStatus::Completed]
    );
    assert_eq!(
        recorder.statuses(1),
        vec![FileStatus::Converting, FileStatus::Failed]
    );
}

#[test]
fn progress_is_weighted_by_stage_and_never_regresses() {
    let dir = tempfile::tempdir().unwrap();
    let files = vec![video_file(dir.path(), "clip.mp4", b"video")];
    let mut converter = Converter::new(FakeEngine::loaded(), GifOptions::default());
    let mut recorder = Recorder::default();

    converter
        .convert(&files, &mut BlobStore::new(), &mut recorder)
        .unwrap();

    // The engine reports 0.25, 0.5, 0.2 and 1.0 in each stage.
    assert_eq!(recorder.progress(0), vec![13, 25, 50, 62, 75, 99, 100]);
}

#[test]
fn session_progress_is_monotonic_per_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_with(vec![
        video_file(dir.path(), "a.mp4", b"a"),
        video_file(dir.path(), "b.mp4", b"b"),
    ]);
    let mut recorder = Recorder::default();

    session.convert(&mut recorder).unwrap();

    for index in 0..2 {
        let seen = recorder.progress(index);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{:?}", seen);
        assert_eq!(seen.last(), Some(&100));
    }
}

#[test]
fn engine_receives_the_two_stage_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_with(vec![video_file(dir.path(), "clip.mp4", b"video")]);

    session.convert(&mut NoopObserver).unwrap();

    let executions = session.engine().executions();
    assert_eq!(executions.len(), 2);
    assert_eq!(
        executions[0].join(" "),
        "-i input.mp4 -vf fps=10,scale=480:-1:flags=lanczos,palettegen=max_colors=256 -y palette.png"
    );
    assert_eq!(
        executions[1].join(" "),
        "-i input.mp4 -i palette.png -filter_complex \
         [0:v]fps=10,scale=480:-1:flags=lanczos[v];[v][1:v]paletteuse=dither=bayer:bayer_scale=5 \
         -y output.gif"
    );
}

#[test]
fn changed_options_apply_to_the_next_batch() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_with(vec![video_file(dir.path(), "clip.mp4", b"video")]);
    let options = GifOptions::default().with_fps(15).with_width(320);
    session.set_options(options.clone());

    session.convert(&mut NoopObserver).unwrap();

    let executions = session.engine().executions();
    assert_eq!(executions[0], palette_args(&options));
    assert_eq!(executions[1], encode_args(&options));
}

#[test]
fn sandbox_is_emptied_after_every_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_with(vec![
        video_file(dir.path(), "a.mp4", CORRUPT),
        video_file(dir.path(), "b.mp4", b"b"),
    ]);

    session.convert(&mut NoopObserver).unwrap();

    assert!(session.engine().sandbox_files().is_empty());
    let input_deletes = session
        .engine()
        .calls
        .iter()
        .filter(|c| **c == Call::Delete("input.mp4".to_string()))
        .count();
    assert_eq!(input_deletes, 2);
}

#[test]
fn results_only_name_selected_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_with(vec![
        video_file(dir.path(), "a.mp4", b"a"),
        video_file(dir.path(), "b.webm", CORRUPT),
        video_file(dir.path(), "c.mov", b"c"),
    ]);

    session.convert(&mut NoopObserver).unwrap();

    let selected: Vec<&str> = session.files().iter().map(SelectedFile::name).collect();
    for result in session.results().results() {
        assert!(selected.contains(&result.file_name.as_str()));
        assert!(session.results().bytes(result).is_some());
    }
    assert_eq!(session.results().len(), 2);
}

#[test]
fn a_new_batch_releases_the_previous_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_with(vec![video_file(dir.path(), "a.mp4", b"a")]);

    let first = session.convert(&mut NoopObserver).unwrap()[0].clone();
    let second = session.convert(&mut NoopObserver).unwrap()[0].clone();

    assert_ne!(first.output_url, second.output_url);
    assert!(session.results().blobs().get(first.output_url).is_none());
    assert!(session.results().blobs().get(second.output_url).is_some());
    assert_eq!(session.results().blobs().len(), 1);
    assert_eq!(session.progress()[0].status, FileStatus::Completed);
}

#[test]
fn engine_log_is_collected_and_capped() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = Session::new(FakeEngine::loaded(), GifOptions::default()).with_log_retention(3);
    session.select_files(vec![
        video_file(dir.path(), "a.mp4", b"a"),
        video_file(dir.path(), "b.mp4", CORRUPT),
    ]);
    let mut recorder = Recorder::default();

    session.convert(&mut recorder).unwrap();

    let forwarded = recorder
        .events
        .iter()
        .filter(|e| matches!(e, Event::Log(_)))
        .count();
    assert_eq!(forwarded, 3);
    assert_eq!(session.logs().len(), 3);
    assert_eq!(
        session.logs().tail(1).collect::<Vec<_>>(),
        vec!["input.mp4: Invalid data found when processing input"]
    );

    session.convert(&mut NoopObserver).unwrap();
    assert_eq!(session.logs().len(), 3);
}

#[test]
fn report_pairs_completed_files_with_their_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_with(vec![
        video_file(dir.path(), "a.mp4", CORRUPT),
        video_file(dir.path(), "b.final.mov", b"b"),
    ]);
    session.convert(&mut NoopObserver).unwrap();

    let report = session.report();

    assert_eq!(report.options, GifOptions::default());
    assert_eq!(report.files[0].status, FileStatus::Failed);
    assert_eq!(report.files[0].download_name, None);
    assert_eq!(report.files[1].status, FileStatus::Completed);
    assert_eq!(report.files[1].download_name.as_deref(), Some("b.gif"));
    assert_eq!(
        report.files[1].output_size,
        Some(b"GIF89a-fake-output".len() as u64)
    );
}
