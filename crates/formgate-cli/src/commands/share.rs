use crate::cli::ShareCommands;
use crate::support::{open_service_or_exit, or_exit, print_json, requester};
use serde_json::json;

pub fn run(command: ShareCommands) {
    match command {
        ShareCommands::Add {
            form_id,
            kind,
            target,
            capabilities,
            actor,
            common,
        } => {
            let service = open_service_or_exit(&common);
            let share = or_exit(service.add_share(
                &requester(&actor),
                form_id,
                kind,
                target.as_deref(),
                capabilities,
            ));

            if common.json {
                print_json(&json!({
                    "action": "share.add",
                    "share": share,
                }));
            } else {
                println!(
                    "formgate share add\n  Share: {} {} {}\n  Capabilities: {}",
                    share.id,
                    share.kind.as_str(),
                    share.target,
                    share.capabilities.wire_names().join(", ")
                );
            }
        }

        ShareCommands::Remove {
            form_id,
            share_id,
            actor,
            common,
        } => {
            let service = open_service_or_exit(&common);
            let share = or_exit(service.remove_share(&requester(&actor), form_id, share_id));

            if common.json {
                print_json(&json!({
                    "action": "share.remove",
                    "share": share,
                }));
            } else {
                println!(
                    "formgate share remove\n  Removed: {} {} {}",
                    share.id,
                    share.kind.as_str(),
                    share.target
                );
            }
        }
    }
}
