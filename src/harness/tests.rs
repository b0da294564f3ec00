use std::fs;
use std::io::Cursor;

use rusqlite::Connection;

use super::*;
use crate::labels::SqliteLabelStore;
use crate::labels::fixtures::{judgment, three_topic_store};
use crate::model::Polarity;
use crate::store::{open_database, open_in_memory};

fn session() -> SessionStore {
    SessionStore::open(open_in_memory().unwrap()).unwrap()
}

fn results(tokens: &[&str]) -> Vec<SubmittedResult> {
    let tokens: Vec<String> = tokens.iter().map(|token| token.to_string()).collect();
    parse_result_tokens(&tokens, tokens.len() / 2).unwrap()
}

fn five_results() -> Vec<SubmittedResult> {
    results(&[
        "doc02", "244", "doc01", "100", "doc12", "999", "doc22", "445", "doc11", "773",
    ])
}

fn assert_protocol_violation<T: std::fmt::Debug>(outcome: HarnessResult<T>) {
    match outcome {
        Err(HarnessError::ProtocolViolation(_)) => {}
        other => panic!("expected protocol violation, got {other:?}"),
    }
}

#[test]
fn scenario_step_reports_on_topic_documents_and_writes_run_file() {
    let labels = three_topic_store();
    let dir = tempfile::tempdir().unwrap();
    let run_file_path = dir.path().join("runfile.txt");
    let writer = RunLogWriter::new(&run_file_path);
    let mut controller = SessionController::new(&labels, 5, Some(writer));
    let mut session = session();

    assert_eq!(controller.init(&mut session, None).unwrap().num_topics, 3);

    let started = controller.start(&session).unwrap();
    assert_eq!(started.topic_id.as_deref(), Some("0"));
    assert_eq!(started.query.as_deref(), Some("topic0"));

    let submitted = five_results();
    let feedback = controller.step(&mut session, "0", &submitted).unwrap();
    assert_eq!(feedback.len(), 5);
    assert!(!session.state().awaiting_stop);

    for (record, result) in feedback.iter().zip(&submitted) {
        assert_eq!(record.document_id, result.document_id);
        assert_eq!(record.confidence, result.confidence);
        assert_eq!(record.topic_id, "0");
    }

    let on_topic: Vec<bool> = feedback.iter().map(|record| record.on_topic).collect();
    assert_eq!(on_topic, vec![true, true, false, false, false]);
    let subtopic_counts: Vec<usize> = feedback.iter().map(|r| r.subtopics.len()).collect();
    assert_eq!(subtopic_counts, vec![1, 1, 0, 0, 0]);
    assert_eq!(feedback[0].subtopics[0].subtopic_id, "subtopic3");
    assert_eq!(feedback[0].subtopics[0].rating, 3);

    let contents = fs::read_to_string(&run_file_path).unwrap();
    let lines: Vec<&str> = contents.lines().filter(|line| !line.starts_with('#')).collect();
    assert_eq!(lines.len(), 5);
    for (line, record) in lines.iter().zip(&feedback) {
        let fields: Vec<&str> = line.split('\t').collect();
        assert_eq!(fields[0], record.topic_id);
        assert_eq!(fields[1], record.document_id);
        assert_eq!(fields[3], if record.on_topic { "1" } else { "0" });
        if record.on_topic {
            let (subtopic, rating) = fields[4].split_once(':').unwrap();
            assert!(!subtopic.is_empty());
            assert!(!rating.is_empty());
        } else {
            assert_eq!(fields[4], "NULL");
        }
    }
    assert_eq!(lines[0], "0\tdoc02\t244.000000\t1\tsubtopic3:3");
}

#[test]
fn full_batch_never_sets_awaiting_stop_and_short_batch_does() {
    let labels = three_topic_store();
    let mut controller = SessionController::new(&labels, 5, None);
    let mut session = session();
    controller.init(&mut session, None).unwrap();

    controller.step(&mut session, "0", &five_results()).unwrap();
    assert!(!session.state().awaiting_stop);

    let short = results(&["doc00", "1", "doc01", "2", "doc02", "3", "doc10", "4"]);
    controller.step(&mut session, "0", &short).unwrap();
    assert!(session.state().awaiting_stop);

    assert_protocol_violation(controller.start(&session));
    assert_protocol_violation(controller.step(&mut session, "0", &five_results()));

    let stopped = controller.stop(&mut session, "0").unwrap();
    assert_eq!(stopped.finished, "0");
    assert_eq!(stopped.num_remaining, 2);
    assert!(!session.state().awaiting_stop);
    assert_eq!(
        controller.start(&session).unwrap().topic_id.as_deref(),
        Some("1")
    );
}

#[test]
fn oversized_batches_are_rejected() {
    let tokens: Vec<String> = (0..11).map(|idx| format!("doc{idx}")).collect();
    assert_protocol_violation(parse_result_tokens(&tokens, 5));

    let labels = three_topic_store();
    let mut controller = SessionController::new(&labels, 5, None);
    let mut session = session();
    controller.init(&mut session, None).unwrap();

    let mut six = five_results();
    six.push(SubmittedResult {
        document_id: "doc00".to_string(),
        confidence: 1.0,
    });
    assert_protocol_violation(controller.step(&mut session, "0", &six));
    assert!(!session.state().awaiting_stop);
}

#[test]
fn parse_result_tokens_rejects_odd_counts_and_bad_confidences() {
    let odd: Vec<String> = ["doc1", "5", "doc2"].iter().map(|s| s.to_string()).collect();
    assert!(matches!(
        parse_result_tokens(&odd, 5),
        Err(HarnessError::Validation(_))
    ));

    let bad: Vec<String> = ["doc1", "high"].iter().map(|s| s.to_string()).collect();
    assert!(matches!(
        parse_result_tokens(&bad, 5),
        Err(HarnessError::Validation(_))
    ));
}

#[test]
fn invalid_results_are_rejected() {
    let labels = three_topic_store();
    let mut controller = SessionController::new(&labels, 5, None);
    let mut session = session();
    controller.init(&mut session, None).unwrap();

    for (document_id, confidence) in [("", 5.0), ("doc00", 1000.5), ("doc00", -1.0)] {
        let outcome = controller.step(
            &mut session,
            "0",
            &[SubmittedResult {
                document_id: document_id.to_string(),
                confidence,
            }],
        );
        assert!(matches!(outcome, Err(HarnessError::Validation(_))));
    }
    assert!(!session.state().awaiting_stop);
}

#[test]
fn stopped_topics_can_never_be_stepped_or_stopped_again() {
    let labels = three_topic_store();
    let mut controller = SessionController::new(&labels, 5, None);
    let mut session = session();
    controller.init(&mut session, None).unwrap();

    controller.stop(&mut session, "0").unwrap();
    assert_protocol_violation(controller.step(&mut session, "0", &five_results()));
    assert_protocol_violation(controller.stop(&mut session, "0"));

    controller.stop(&mut session, "1").unwrap();
    controller.stop(&mut session, "2").unwrap();
    assert_protocol_violation(controller.stop(&mut session, "2"));

    let finished = controller.start(&session).unwrap();
    assert_eq!(finished.topic_id, None);
    assert_eq!(finished.query, None);
}

#[test]
fn stepping_a_topic_other_than_the_head_is_out_of_sync() {
    let labels = three_topic_store();
    let mut controller = SessionController::new(&labels, 5, None);
    let mut session = session();
    controller.init(&mut session, None).unwrap();

    assert_protocol_violation(controller.step(&mut session, "1", &five_results()));
    assert_protocol_violation(controller.stop(&mut session, "2"));
}

#[test]
fn negative_judgment_marks_document_off_topic() {
    let mut second_annotator = judgment("T", "docB", "s2", Polarity::Positive, 1);
    second_annotator.annotator = "other".to_string();

    let mut labels = SqliteLabelStore::new(open_in_memory().unwrap());
    labels
        .put_all(&[
            judgment("T", "docA", "s1", Polarity::Positive, 3),
            judgment("T", "docA", "s2", Polarity::Negative, 0),
            judgment("T", "docB", "s1", Polarity::Positive, 2),
            judgment("T", "docB", "s2", Polarity::Positive, 1),
            second_annotator,
        ])
        .unwrap();

    let mut controller = SessionController::new(&labels, 2, None);
    let mut session = session();
    controller.init(&mut session, None).unwrap();

    let feedback = controller
        .step(&mut session, "T", &results(&["docA", "10", "docB", "20"]))
        .unwrap();
    assert!(!feedback[0].on_topic);
    assert!(feedback[0].subtopics.is_empty());

    assert!(feedback[1].on_topic);
    let subtopics: Vec<&str> = feedback[1]
        .subtopics
        .iter()
        .map(|entry| entry.subtopic_id.as_str())
        .collect();
    assert_eq!(subtopics, vec!["s1", "s2", "s2"]);
}

#[test]
fn start_and_step_fail_on_empty_label_store() {
    let labels = SqliteLabelStore::new(open_in_memory().unwrap());
    let mut controller = SessionController::new(&labels, 5, None);
    let mut session = session();

    assert_eq!(controller.init(&mut session, None).unwrap().num_topics, 0);
    assert_protocol_violation(controller.start(&session));
    assert_protocol_violation(controller.step(&mut session, "0", &[]));
}

#[test]
fn init_with_filter_follows_filter_order_and_resets_state() {
    let labels = three_topic_store();
    let mut controller = SessionController::new(&labels, 5, None);
    let mut session = session();

    controller.init(&mut session, None).unwrap();
    controller
        .step(&mut session, "0", &results(&["doc00", "5"]))
        .unwrap();
    assert!(session.state().awaiting_stop);

    let filter = vec!["2".to_string(), "missing".to_string(), "0".to_string(), "2".to_string()];
    let response = controller.init(&mut session, Some(filter.as_slice())).unwrap();
    assert_eq!(response.num_topics, 2);
    assert!(!session.state().awaiting_stop);

    let roster: Vec<&str> = session
        .state()
        .roster
        .iter()
        .map(|topic| topic.topic_id.as_str())
        .collect();
    assert_eq!(roster, vec!["2", "0"]);
}

#[test]
fn session_state_survives_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("trec_dd.sqlite");

    let mut labels = SqliteLabelStore::new(open_database(&db_path).unwrap());
    labels
        .put_all(&three_topic_store().everything().unwrap())
        .unwrap();

    {
        let mut controller = SessionController::new(&labels, 5, None);
        let mut session = SessionStore::open(open_database(&db_path).unwrap()).unwrap();
        controller.init(&mut session, None).unwrap();
        controller.stop(&mut session, "0").unwrap();
        controller
            .step(&mut session, "1", &results(&["doc10", "7"]))
            .unwrap();
    }

    let reopened = SessionStore::open(open_database(&db_path).unwrap()).unwrap();
    assert!(reopened.state().awaiting_stop);
    assert_eq!(reopened.state().roster.len(), 2);
    assert_eq!(
        reopened.state().current_topic().map(|t| t.topic_id.as_str()),
        Some("1")
    );
}

#[test]
fn session_store_starts_empty() {
    let store = SessionStore::open(open_in_memory().unwrap()).unwrap();
    assert_eq!(store.state(), &SessionState::default());
}

#[test]
fn run_file_round_trip_preserves_order_and_ranks() {
    let labels = three_topic_store();
    let dir = tempfile::tempdir().unwrap();
    let run_file_path = dir.path().join("run.txt");

    {
        let writer = RunLogWriter::new(&run_file_path);
        let mut controller = SessionController::new(&labels, 5, Some(writer));
        let mut session = session();
        controller.init(&mut session, None).unwrap();
        controller.step(&mut session, "0", &five_results()).unwrap();
        controller
            .step(&mut session, "0", &results(&["doc00", "1"]))
            .unwrap();
        controller.stop(&mut session, "0").unwrap();
        controller
            .step(&mut session, "1", &results(&["doc11", "50", "doc01", "40"]))
            .unwrap();
        controller.stop(&mut session, "1").unwrap();
    }

    // A second writer appends below the existing content without a header.
    RunLogWriter::new(&run_file_path)
        .append(&[FeedbackRecord {
            topic_id: "2".to_string(),
            document_id: "doc20".to_string(),
            confidence: 3.0,
            on_topic: true,
            subtopics: vec![SubtopicFeedback {
                subtopic_id: "subtopic1".to_string(),
                rating: 1,
            }],
        }])
        .unwrap();
    let headers = fs::read_to_string(&run_file_path)
        .unwrap()
        .lines()
        .filter(|line| line.starts_with('#'))
        .count();
    assert_eq!(headers, 1);

    let run = load_run(&run_file_path).unwrap();
    assert_eq!(run.topic_order, vec!["0", "1", "2"]);

    let topic0 = &run.results["0"];
    let documents: Vec<&str> = topic0.iter().map(|r| r.document_id.as_str()).collect();
    assert_eq!(
        documents,
        vec!["doc02", "doc01", "doc12", "doc22", "doc11", "doc00"]
    );
    let ranks: Vec<usize> = topic0.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(topic0[0].confidence, 244.0);
    assert!(topic0[0].on_topic);
    assert_eq!(topic0[0].subtopics[0].subtopic_id, "subtopic3");
    assert!(!topic0[2].on_topic);
    assert!(topic0[2].subtopics.is_empty());

    let topic1 = &run.results["1"];
    assert_eq!(topic1.len(), 2);
    assert_eq!(topic1[0].rank, 1);
    assert!(topic1[0].on_topic);
    assert!(!topic1[1].on_topic);
}

#[test]
fn multi_subtopic_record_expands_to_one_line_per_subtopic() {
    let record = FeedbackRecord {
        topic_id: "T".to_string(),
        document_id: "docB".to_string(),
        confidence: 12.5,
        on_topic: true,
        subtopics: vec![
            SubtopicFeedback {
                subtopic_id: "s1".to_string(),
                rating: 2,
            },
            SubtopicFeedback {
                subtopic_id: "s2".to_string(),
                rating: 1,
            },
        ],
    };

    assert_eq!(
        format_record(&record).unwrap(),
        vec!["T\tdocB\t12.500000\t1\ts1:2", "T\tdocB\t12.500000\t1\ts2:1"]
    );
}

#[test]
fn parse_run_skips_comments_and_splits_stanzas() {
    let input = "# header\n\nT\tdocA\t1.0\t1\ts1:2|s2:3\nT\tdocB\t0.5\t0\tNULL\n";
    let run = parse_run(Cursor::new(input), "inline").unwrap();

    let records = &run.results["T"];
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].subtopics.len(), 2);
    assert_eq!(records[0].subtopics[1].subtopic_id, "s2");
    assert_eq!(records[0].subtopics[1].rating, 3);
    assert_eq!(records[1].rank, 2);
    assert_eq!(run.record_count(), 2);
}

#[test]
fn parse_run_rejects_integrity_violations() {
    let cases = [
        "T\tdocA\t1.0\t1\n",
        "T\tdocA\t1.0\t1\tNULL\n",
        "T\tdocA\t1.0\t2\tNULL\n",
        "T\tdocA\tabc\t0\tNULL\n",
        "T\tdocA\t1.0\t1\ts1\n",
        "A\tdoc\t1.0\t0\tNULL\nB\tdoc\t1.0\t0\tNULL\nA\tdoc\t1.0\t0\tNULL\n",
        "A\tdoc\t1.0\t0\tNULL\nB\tdoc\t1.0\t0\tNULL\nC\tdoc\t1.0\t0\tNULL\nB\tdoc\t1.0\t0\tNULL\n",
    ];

    for input in cases {
        let outcome = parse_run(Cursor::new(input), "inline");
        assert!(
            matches!(outcome, Err(HarnessError::Integrity(_))),
            "expected integrity error for {input:?}, got {outcome:?}"
        );
    }
}

#[test]
fn session_store_requires_the_schema() {
    let outcome = SessionStore::open(Connection::open_in_memory().unwrap());
    assert!(matches!(outcome, Err(HarnessError::Storage(_))));
}

#[test]
fn document_ids_with_line_syntax_are_rejected_before_logging() {
    let labels = three_topic_store();
    let dir = tempfile::tempdir().unwrap();
    let run_file_path = dir.path().join("run.txt");
    let mut controller = SessionController::new(&labels, 5, Some(RunLogWriter::new(&run_file_path)));
    let mut session = session();
    controller.init(&mut session, None).unwrap();

    for document_id in ["doc\tX", "doc\nX", "doc\rX"] {
        let outcome = controller.step(
            &mut session,
            "0",
            &[SubmittedResult {
                document_id: document_id.to_string(),
                confidence: 1.0,
            }],
        );
        assert!(matches!(outcome, Err(HarnessError::Validation(_))), "{document_id:?}");
    }
    assert!(!session.state().awaiting_stop);
    assert!(!run_file_path.exists());
}

#[test]
fn unrepresentable_subtopic_ids_never_reach_the_run_file() {
    let mut labels = SqliteLabelStore::new(open_in_memory().unwrap());
    labels
        .put_all(&[
            judgment("T", "docA", "s1", Polarity::Positive, 2),
            judgment("T", "docB", "off|set", Polarity::Positive, 1),
        ])
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let run_file_path = dir.path().join("run.txt");
    let mut controller = SessionController::new(&labels, 1, Some(RunLogWriter::new(&run_file_path)));
    let mut session = session();
    controller.init(&mut session, None).unwrap();

    controller
        .step(&mut session, "T", &results(&["docA", "5"]))
        .unwrap();
    let outcome = controller.step(&mut session, "T", &results(&["docB", "4"]));
    assert!(matches!(outcome, Err(HarnessError::Integrity(_))));

    let run = load_run(&run_file_path).unwrap();
    assert_eq!(run.record_count(), 1);
    assert_eq!(run.results["T"][0].document_id, "docA");
}

#[test]
fn format_record_rejects_identifiers_that_break_the_line_syntax() {
    let base = FeedbackRecord {
        topic_id: "T".to_string(),
        document_id: "docA".to_string(),
        confidence: 1.0,
        on_topic: true,
        subtopics: vec![SubtopicFeedback {
            subtopic_id: "s1".to_string(),
            rating: 1,
        }],
    };
    assert!(format_record(&base).is_ok());

    let mut comment_topic = base.clone();
    comment_topic.topic_id = "#T".to_string();
    let mut tab_topic = base.clone();
    tab_topic.topic_id = "T\t1".to_string();
    let mut newline_document = base.clone();
    newline_document.document_id = "doc\nA".to_string();
    let mut piped_subtopic = base.clone();
    piped_subtopic.subtopics[0].subtopic_id = "s|1".to_string();
    let mut carriage_subtopic = base.clone();
    carriage_subtopic.subtopics[0].subtopic_id = "s\r1".to_string();

    for record in [comment_topic, tab_topic, newline_document, piped_subtopic, carriage_subtopic] {
        assert!(
            matches!(format_record(&record), Err(HarnessError::Integrity(_))),
            "{record:?}"
        );
    }
}

#[test]
fn rejected_first_step_leaves_no_run_file() {
    let labels = three_topic_store();
    let dir = tempfile::tempdir().unwrap();
    let run_file_path = dir.path().join("run.txt");
    let mut controller = SessionController::new(&labels, 5, Some(RunLogWriter::new(&run_file_path)));
    let mut session = session();
    controller.init(&mut session, None).unwrap();

    assert_protocol_violation(controller.step(&mut session, "1", &five_results()));
    assert!(matches!(
        controller.step(
            &mut session,
            "0",
            &[SubmittedResult {
                document_id: "doc00".to_string(),
                confidence: 1001.0,
            }],
        ),
        Err(HarnessError::Validation(_))
    ));
    assert!(!run_file_path.exists());

    controller.step(&mut session, "0", &five_results()).unwrap();
    let contents = fs::read_to_string(&run_file_path).unwrap();
    assert!(contents.starts_with("# trec-dd run file created "));
}
