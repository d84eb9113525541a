use crate::cli::ResultsCommands;
use crate::support::{block_on_or_exit, fail, open_service_or_exit, or_exit, print_json, requester};
use serde_json::json;

pub fn run(command: ResultsCommands) {
    match command {
        ResultsCommands::List {
            form_id,
            actor,
            common,
        } => {
            let service = open_service_or_exit(&common);
            let submissions = or_exit(service.list_submissions(&requester(&actor), form_id));

            if common.json {
                print_json(&json!({
                    "action": "results.list",
                    "formId": form_id,
                    "count": submissions.len(),
                    "submissions": submissions,
                }));
                return;
            }

            println!(
                "formgate results list {form_id} ({} submissions)",
                submissions.len()
            );
            for submission in &submissions {
                println!(
                    "  {} by {} at {}",
                    submission.id,
                    submission.submitter,
                    submission.submitted_at.to_rfc3339()
                );
                for answer in &submission.answers {
                    println!("      q{}: {}", answer.question_id, answer.value.text());
                }
            }
        }

        ResultsCommands::Delete {
            form_id,
            ids,
            all,
            actor,
            common,
        } => {
            let selection = match (all, ids.is_empty()) {
                (true, _) => None,
                (false, false) => Some(ids),
                (false, true) => fail("pass --id N (repeatable) or --all"),
            };
            let service = open_service_or_exit(&common);
            let deleted = or_exit(block_on_or_exit(service.delete_submissions(
                &requester(&actor),
                form_id,
                selection,
            )));

            if common.json {
                print_json(&json!({
                    "action": "results.delete",
                    "formId": form_id,
                    "deleted": deleted,
                }));
            } else {
                println!("formgate results delete {form_id}\n  Deleted: {deleted}");
            }
        }
    }
}
