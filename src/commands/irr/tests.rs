use std::fs;
use std::path::Path;

use serde_json::json;

use super::cues::{align_cues, parse_vtt_cues};
use super::passes::collect_passes;
use super::run::{clip_cell, eligible_pair, multi_speaker_evidence};
use crate::cli::IrrArgs;
use crate::model::{IrrReport, IrrTrend};

const TAGGED_VTT: &str = "WEBVTT\n\n00:00:01.000 --> 00:00:03.500\n<v S1> marhaba\n\n00:00:04.000 --> 00:00:06.000\nplain line\n";

#[test]
fn parse_vtt_extracts_timing_text_and_voice_tags() {
    let cues = parse_vtt_cues(TAGGED_VTT).unwrap();
    assert_eq!(cues.len(), 2);
    assert!((cues[0].start_secs - 1.0).abs() < 1e-9);
    assert!((cues[0].end_secs - 3.5).abs() < 1e-9);
    assert!(cues[0].has_voice_tag);
    assert_eq!(cues[0].text, "<v S1> marhaba");
    assert!(!cues[1].has_voice_tag);
}

#[test]
fn parse_vtt_handles_missing_fraction_and_trailing_cue() {
    let cues = parse_vtt_cues("WEBVTT\n\n00:01:02 --> 00:01:05\nhello").unwrap();
    assert_eq!(cues.len(), 1);
    assert!((cues[0].start_secs - 62.0).abs() < 1e-9);
}

#[test]
fn align_cues_pairs_within_tolerance_only() {
    let left = parse_vtt_cues(
        "00:00:01.000 --> 00:00:02.000\na\n\n00:00:05.000 --> 00:00:06.000\nb\n",
    )
    .unwrap();
    let right = parse_vtt_cues(
        "00:00:01.100 --> 00:00:02.000\na\n\n00:00:05.500 --> 00:00:06.000\nb\n",
    )
    .unwrap();

    let pairs = align_cues(&left, &right, 0.12);
    assert_eq!(pairs.len(), 1);
    assert!((pairs[0].0.start_secs - 1.0).abs() < 1e-9);
}

fn write_pass(root: &Path, asset: &str, pass: &str, annotator: &str, spans: usize, vtt: &str) {
    let dir = root.join(asset).join(pass).join(annotator);
    fs::create_dir_all(&dir).unwrap();
    let spans: Vec<_> = (0..spans).map(|i| json!({"start": i, "end": i + 1})).collect();
    fs::write(
        dir.join("code_switch_spans.json"),
        serde_json::to_vec(&json!(spans)).unwrap(),
    )
    .unwrap();
    fs::write(dir.join("transcript.vtt"), vtt).unwrap();
}

#[test]
fn collect_passes_reads_pass_and_annotator_segments() {
    let dir = tempfile::tempdir().unwrap();
    write_pass(dir.path(), "clip-1", "pass_1", "alice", 1, TAGGED_VTT);
    write_pass(dir.path(), "clip-1", "pass-2", "Bob", 0, TAGGED_VTT);

    let clips = collect_passes(dir.path()).unwrap();
    let clip = clips.get("clip-1").unwrap();
    assert_eq!(clip.passes.len(), 2);
    assert_eq!(clip.passes[&1].annotator, "alice");
    assert_eq!(clip.passes[&2].annotator, "bob");
    assert_eq!(clip.passes[&1].has_code_switch, Some(true));
    assert_eq!(clip.passes[&2].has_code_switch, Some(false));
    assert_eq!(clip.passes[&1].cues.as_ref().unwrap().len(), 2);
}

#[test]
fn clips_need_two_distinct_annotators() {
    let dir = tempfile::tempdir().unwrap();
    write_pass(dir.path(), "clip-1", "pass_1", "alice", 1, TAGGED_VTT);
    write_pass(dir.path(), "clip-1", "pass_2", "alice", 1, TAGGED_VTT);
    write_pass(dir.path(), "clip-2", "pass_1", "alice", 1, TAGGED_VTT);

    let clips = collect_passes(dir.path()).unwrap();
    assert!(eligible_pair(clips.get("clip-1").unwrap()).is_none());
    assert!(eligible_pair(clips.get("clip-2").unwrap()).is_none());
}

#[test]
fn clip_cell_prefers_assignment_and_wildcards_speaker_fields() {
    let meta = json!({
        "assigned_cell": "Gulf:Coastal:f:18-29",
        "dialect_family": "levantine"
    });
    assert_eq!(clip_cell(Some(&meta)).canonical(), "gulf:coastal:*:*");

    let attrs_only = json!({"dialect_family": "Levantine", "subregion": "Urban North"});
    assert_eq!(
        clip_cell(Some(&attrs_only)).canonical(),
        "levantine:urban north:*:*"
    );
    assert_eq!(clip_cell(None).canonical(), "unknown:unknown:*:*");
}

#[test]
fn multi_speaker_detection_probes_flags_counts_and_lists() {
    assert!(multi_speaker_evidence(Some(&json!({"multi_speaker": "yes"}))).is_some());
    assert!(multi_speaker_evidence(Some(&json!({"speaker_count": 2}))).is_some());
    assert!(multi_speaker_evidence(Some(&json!({"speakers": ["s1", "s2"]}))).is_some());
    assert!(multi_speaker_evidence(Some(&json!({"speaker_count": 1}))).is_none());
    assert!(multi_speaker_evidence(None).is_none());
}

#[test]
fn irr_run_scores_agreement_and_flags_missing_voice_tags() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let annotations = root.join("annotations");
    let untagged = "00:00:01.000 --> 00:00:02.000\nno tag here\n";

    // Perfect agreement on code switching; clip-2 is multi-speaker but
    // neither pass tagged a voice.
    write_pass(&annotations, "clip-1", "pass_1", "alice", 1, TAGGED_VTT);
    write_pass(&annotations, "clip-1", "pass_2", "bob", 1, TAGGED_VTT);
    write_pass(&annotations, "clip-2", "pass_1", "alice", 0, untagged);
    write_pass(&annotations, "clip-2", "pass_2", "bob", 0, untagged);
    fs::write(
        annotations.join("clip-2").join("item_meta.json"),
        serde_json::to_vec(&json!({"dialect_family": "Gulf", "speaker_count": 2})).unwrap(),
    )
    .unwrap();

    super::run(IrrArgs {
        data_root: root.clone(),
        annotations_root: None,
    })
    .unwrap();

    let report: IrrReport =
        serde_json::from_str(&fs::read_to_string(root.join("irr/irr.json")).unwrap()).unwrap();
    assert_eq!(report.judgments.has_code_switch.n_items_global, 2);
    assert_eq!(report.judgments.has_code_switch.alpha_global, Some(1.0));
    // Cells below the minimum item count still appear, with a null alpha.
    let by_cell = &report.judgments.has_code_switch.by_cell;
    assert_eq!(by_cell.len(), 2);
    for cell in by_cell {
        assert_eq!(cell.alpha, None);
        assert_eq!(cell.n_items, 1);
    }

    let missing = report.judgments.voice_tag.missing_voice_tags.unwrap();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].asset_id, "clip-2");
    assert_eq!(missing[0].cell, "gulf:unknown:*:*");

    let trend: IrrTrend =
        serde_json::from_str(&fs::read_to_string(root.join("irr/irr_trend.json")).unwrap())
            .unwrap();
    assert_eq!(trend.get("has_code_switch").unwrap().len(), 1);
    assert_eq!(trend.get("voice_tag").unwrap().len(), 1);
}

#[test]
fn cells_at_the_item_floor_get_a_computed_alpha() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let annotations = root.join("annotations");

    for index in 0..10 {
        let asset = format!("clip-{index}");
        write_pass(&annotations, &asset, "pass_1", "alice", 1, TAGGED_VTT);
        write_pass(&annotations, &asset, "pass_2", "bob", 1, TAGGED_VTT);
        fs::write(
            annotations.join(&asset).join("item_meta.json"),
            serde_json::to_vec(&json!({"assigned_cell": "gulf:coastal:f:18-29"})).unwrap(),
        )
        .unwrap();
    }

    super::run(IrrArgs {
        data_root: root.clone(),
        annotations_root: None,
    })
    .unwrap();

    let report: IrrReport =
        serde_json::from_str(&fs::read_to_string(root.join("irr/irr.json")).unwrap()).unwrap();
    let by_cell = &report.judgments.has_code_switch.by_cell;
    assert_eq!(by_cell.len(), 1);
    assert_eq!(by_cell[0].cell, "gulf:coastal:*:*");
    assert_eq!(by_cell[0].n_items, 10);
    assert_eq!(by_cell[0].alpha, Some(1.0));
}

#[test]
fn irr_rerun_replaces_same_day_trend_entry() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let annotations = root.join("annotations");
    write_pass(&annotations, "clip-1", "pass_1", "alice", 1, TAGGED_VTT);
    write_pass(&annotations, "clip-1", "pass_2", "bob", 1, TAGGED_VTT);

    let args = IrrArgs {
        data_root: root.clone(),
        annotations_root: None,
    };
    super::run(args.clone()).unwrap();
    super::run(args).unwrap();

    let trend: IrrTrend =
        serde_json::from_str(&fs::read_to_string(root.join("irr/irr_trend.json")).unwrap())
            .unwrap();
    assert_eq!(trend.get("has_code_switch").unwrap().len(), 1);
}

#[test]
fn irr_run_tolerates_missing_annotations_root() {
    let dir = tempfile::tempdir().unwrap();
    super::run(IrrArgs {
        data_root: dir.path().to_path_buf(),
        annotations_root: None,
    })
    .unwrap();

    let report: IrrReport = serde_json::from_str(
        &fs::read_to_string(dir.path().join("irr/irr.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(report.judgments.has_code_switch.n_items_global, 0);
    assert_eq!(report.judgments.has_code_switch.alpha_global, None);
}
