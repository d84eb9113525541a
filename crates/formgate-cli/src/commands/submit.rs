use crate::cli::{ActorArgs, StoreArgs, SubmissionCommands};
use crate::support::{
    block_on_or_exit, form_id_or_exit, open_service_or_exit, parse_answers_or_exit,
    parse_time_or_exit, print_json, reject_service, reject_submission, requester,
};
use serde_json::json;

pub fn run_submit(
    form_id: Option<u64>,
    answers: String,
    at: Option<String>,
    actor: ActorArgs,
    common: StoreArgs,
) {
    let answers = parse_answers_or_exit(&answers);
    let now = parse_time_or_exit(at.as_deref());
    let service = open_service_or_exit(&common);
    let form_id = form_id_or_exit(&service, form_id, &actor);
    let caller = requester(&actor);

    let outcome = block_on_or_exit(service.validate_and_commit(&caller, form_id, &answers, now));
    let submission_id =
        outcome.unwrap_or_else(|err| reject_submission("submit", &err, common.json));

    if common.json {
        print_json(&json!({
            "action": "submit",
            "accepted": true,
            "formId": form_id,
            "submissionId": submission_id,
        }));
    } else {
        println!("formgate submit {form_id}\n  Accepted: submission {submission_id}");
    }
}

pub fn run(command: SubmissionCommands) {
    match command {
        SubmissionCommands::Edit {
            form_id,
            answers,
            at,
            actor,
            common,
        } => {
            let answers = parse_answers_or_exit(&answers);
            let now = parse_time_or_exit(at.as_deref());
            let service = open_service_or_exit(&common);
            let caller = requester(&actor);

            let outcome =
                block_on_or_exit(service.update_submission(&caller, form_id, &answers, now));
            let submission_id = outcome
                .unwrap_or_else(|err| reject_service("submission.edit", err, common.json));

            if common.json {
                print_json(&json!({
                    "action": "submission.edit",
                    "accepted": true,
                    "formId": form_id,
                    "submissionId": submission_id,
                }));
            } else {
                println!(
                    "formgate submission edit {form_id}\n  Updated: submission {submission_id}"
                );
            }
        }
    }
}
