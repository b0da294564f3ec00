use anyhow::Result;

use super::{open_stores, run_log};
use crate::cli::{InitArgs, StepArgs, StopArgs};
use crate::config::HarnessConfig;
use crate::harness::{SessionController, parse_result_tokens};
use crate::util::write_json_stdout;

pub fn init(config: &HarnessConfig, args: InitArgs, one_line: bool) -> Result<()> {
    let (labels, mut session) = open_stores(config)?;
    let controller = SessionController::new(&labels, config.batch_size, None);

    let filter = if !args.topic_ids.is_empty() {
        Some(args.topic_ids.as_slice())
    } else if !config.topic_ids.is_empty() {
        Some(config.topic_ids.as_slice())
    } else {
        None
    };

    let response = controller.init(&mut session, filter)?;
    write_json_stdout(&response, one_line)
}

pub fn start(config: &HarnessConfig, one_line: bool) -> Result<()> {
    let (labels, session) = open_stores(config)?;
    let controller = SessionController::new(&labels, config.batch_size, None);

    let response = controller.start(&session)?;
    write_json_stdout(&response, one_line)
}

pub fn step(config: &HarnessConfig, args: StepArgs, one_line: bool) -> Result<()> {
    let results = parse_result_tokens(&args.results, config.batch_size)?;

    let (labels, mut session) = open_stores(config)?;
    let mut controller = SessionController::new(&labels, config.batch_size, run_log(config));

    let feedback = controller.step(&mut session, &args.topic_id, &results)?;
    write_json_stdout(&feedback, one_line)
}

pub fn stop(config: &HarnessConfig, args: StopArgs, one_line: bool) -> Result<()> {
    let (labels, mut session) = open_stores(config)?;
    let controller = SessionController::new(&labels, config.batch_size, None);

    let response = controller.stop(&mut session, &args.topic_id)?;
    write_json_stdout(&response, one_line)
}
