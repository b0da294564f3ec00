use std::collections::BTreeSet;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use super::{open_stores, run_log};
use crate::cli::DemoArgs;
use crate::config::HarnessConfig;
use crate::error::HarnessResult;
use crate::harness::{RunLogWriter, SessionController, SessionStore};
use crate::labels::LabelStore;
use crate::model::{DemoResponse, SubmittedResult};
use crate::util::write_json_stdout;

pub fn run(config: &HarnessConfig, args: DemoArgs, one_line: bool) -> Result<()> {
    let (labels, mut session) = open_stores(config)?;

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let filter = (!config.topic_ids.is_empty()).then_some(config.topic_ids.as_slice());
    let mut response = random_baseline(
        &labels,
        &mut session,
        BaselineOptions {
            batch_size: config.batch_size,
            steps_per_topic: args.steps_per_topic,
            reset_roster: !args.resume,
            topic_filter: filter,
        },
        run_log(config),
        &mut rng,
    )?;
    response.run_file_path = config
        .run_file_path
        .as_ref()
        .map(|path| path.display().to_string());

    info!(
        topics = response.topics_evaluated,
        steps = response.steps,
        results = response.results_submitted,
        "random baseline finished"
    );
    write_json_stdout(&response, one_line)
}

pub struct BaselineOptions<'a> {
    pub batch_size: usize,
    pub steps_per_topic: usize,
    pub reset_roster: bool,
    pub topic_filter: Option<&'a [String]>,
}

/// Walks the roster with a system that submits random judged documents for
/// each topic and ignores the feedback.
pub fn random_baseline<L: LabelStore + ?Sized, R: Rng>(
    labels: &L,
    session: &mut SessionStore,
    options: BaselineOptions<'_>,
    run_log: Option<RunLogWriter>,
    rng: &mut R,
) -> HarnessResult<DemoResponse> {
    let mut controller = SessionController::new(labels, options.batch_size, run_log);
    if options.reset_roster {
        controller.init(session, options.topic_filter)?;
    }

    let mut response = DemoResponse {
        topics_evaluated: 0,
        steps: 0,
        results_submitted: 0,
        run_file_path: None,
    };

    while let Some(topic_id) = controller.start(session)?.topic_id {
        let mut remaining = judged_documents(labels, &topic_id)?;

        for _ in 0..options.steps_per_topic {
            let picks: Vec<String> = remaining
                .choose_multiple(rng, options.batch_size)
                .cloned()
                .collect();
            remaining.retain(|document_id| !picks.contains(document_id));

            let results: Vec<SubmittedResult> = picks
                .into_iter()
                .map(|document_id| SubmittedResult {
                    document_id,
                    confidence: f64::from(rng.gen_range(0..=1000_u32)),
                })
                .collect();

            controller.step(session, &topic_id, &results)?;
            response.steps += 1;
            response.results_submitted += results.len();

            if results.len() < options.batch_size {
                debug!(topic_id = %topic_id, "ran out of documents");
                break;
            }
        }

        controller.stop(session, &topic_id)?;
        response.topics_evaluated += 1;
    }

    Ok(response)
}

fn judged_documents<L: LabelStore + ?Sized>(labels: &L, topic_id: &str) -> HarnessResult<Vec<String>> {
    let documents: BTreeSet<String> = labels
        .directly_connected(topic_id)?
        .into_iter()
        .filter(|judgment| judgment.topic_id == topic_id)
        .map(|judgment| judgment.document_id)
        .collect();
    Ok(documents.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::load_run;
    use crate::labels::fixtures::three_topic_store;
    use crate::store::open_in_memory;

    fn options<'a>(batch_size: usize) -> BaselineOptions<'a> {
        BaselineOptions {
            batch_size,
            steps_per_topic: 5,
            reset_roster: true,
            topic_filter: None,
        }
    }

    #[test]
    fn baseline_walks_every_topic_until_documents_run_out() {
        let labels = three_topic_store();
        let mut session = SessionStore::open(open_in_memory().unwrap()).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let response = random_baseline(&labels, &mut session, options(2), None, &mut rng).unwrap();

        assert_eq!(response.topics_evaluated, 3);
        assert_eq!(response.steps, 6);
        assert_eq!(response.results_submitted, 9);
        assert!(session.state().roster.is_empty());
        assert!(!session.state().awaiting_stop);
    }

    #[test]
    fn baseline_writes_a_scoreable_run_file() {
        let labels = three_topic_store();
        let mut session = SessionStore::open(open_in_memory().unwrap()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("random.run");
        let mut rng = StdRng::seed_from_u64(42);

        random_baseline(
            &labels,
            &mut session,
            options(5),
            Some(RunLogWriter::new(&path)),
            &mut rng,
        )
        .unwrap();

        let run = load_run(&path).unwrap();
        assert_eq!(run.topic_order, vec!["0", "1", "2"]);
        assert_eq!(run.record_count(), 9);
        for (topic_id, records) in run.topics() {
            assert!(records.iter().all(|record| record.on_topic), "topic {topic_id}");
            assert!(records
                .iter()
                .all(|record| (0.0..=1000.0).contains(&record.confidence)));
        }
    }

    #[test]
    fn baseline_respects_topic_filter() {
        let labels = three_topic_store();
        let mut session = SessionStore::open(open_in_memory().unwrap()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let filter = vec!["2".to_string()];

        let response = random_baseline(
            &labels,
            &mut session,
            BaselineOptions {
                topic_filter: Some(filter.as_slice()),
                ..options(5)
            },
            None,
            &mut rng,
        )
        .unwrap();

        assert_eq!(response.topics_evaluated, 1);
        assert_eq!(response.steps, 1);
        assert_eq!(response.results_submitted, 3);
    }
}
