use crate::cli::LeaseCommands;
use crate::support::{open_service_or_exit, or_exit, parse_time_or_exit, print_json, requester};
use serde_json::json;

pub fn run(command: LeaseCommands) {
    match command {
        LeaseCommands::Acquire {
            form_id,
            at,
            actor,
            common,
        } => {
            let now = parse_time_or_exit(at.as_deref());
            let service = open_service_or_exit(&common);
            let lease = or_exit(service.acquire_edit_lease(&requester(&actor), form_id, now));

            if common.json {
                print_json(&json!({
                    "action": "lease.acquire",
                    "formId": form_id,
                    "lease": lease,
                }));
            } else {
                println!(
                    "formgate lease acquire {form_id}\n  Holder: {}\n  Expires: {}",
                    lease.holder,
                    lease.expires_at.to_rfc3339()
                );
            }
        }

        LeaseCommands::Release {
            form_id,
            at,
            actor,
            common,
        } => {
            let now = parse_time_or_exit(at.as_deref());
            let service = open_service_or_exit(&common);
            or_exit(service.release_edit_lease(&requester(&actor), form_id, now));

            if common.json {
                print_json(&json!({
                    "action": "lease.release",
                    "formId": form_id,
                }));
            } else {
                println!("formgate lease release {form_id}\n  Released");
            }
        }
    }
}
