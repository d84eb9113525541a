use crate::cli::QuestionCommands;
use crate::support::{
    fail, open_service_or_exit, or_exit, parse_time_or_exit, print_json, requester,
};
use formgate_kernel::{ChoiceOption, QuestionDraft};
use serde_json::{Map, Value, json};

pub fn run(command: QuestionCommands) {
    match command {
        QuestionCommands::Add {
            form_id,
            question_type,
            text,
            required,
            settings,
            options,
            at,
            actor,
            common,
        } => {
            let draft = QuestionDraft {
                question_type,
                text,
                is_required: required,
                extra_settings: parse_settings_or_exit(settings.as_deref()),
                options: options
                    .into_iter()
                    .enumerate()
                    .map(|(index, text)| ChoiceOption {
                        id: 0,
                        text,
                        order: index as u32 + 1,
                    })
                    .collect(),
                ..QuestionDraft::default()
            };
            let now = parse_time_or_exit(at.as_deref());
            let service = open_service_or_exit(&common);
            let question = or_exit(service.add_question(&requester(&actor), form_id, draft, now));

            if common.json {
                print_json(&json!({
                    "action": "question.add",
                    "formId": form_id,
                    "question": question,
                }));
            } else {
                println!(
                    "formgate question add\n  Added: #{} at position {} [{}]",
                    question.id,
                    question.order,
                    question.question_type().as_str()
                );
                for option in &question.options {
                    println!("    option {}: {}", option.id, option.text);
                }
            }
        }

        QuestionCommands::Delete {
            form_id,
            question_id,
            at,
            actor,
            common,
        } => {
            let now = parse_time_or_exit(at.as_deref());
            let service = open_service_or_exit(&common);
            or_exit(service.delete_question(&requester(&actor), form_id, question_id, now));

            if common.json {
                print_json(&json!({
                    "action": "question.delete",
                    "formId": form_id,
                    "questionId": question_id,
                }));
            } else {
                println!("formgate question delete\n  Deleted: #{question_id} from form {form_id}");
            }
        }
    }
}

fn parse_settings_or_exit(raw: Option<&str>) -> Map<String, Value> {
    let Some(raw) = raw else {
        return Map::new();
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(settings)) => settings,
        Ok(_) => fail("--settings must be a JSON object"),
        Err(e) => fail(format!("invalid --settings JSON: {e}")),
    }
}
