use crate::cli::{ActorArgs, StoreArgs};
use crate::support::{
    form_id_or_exit, open_service_or_exit, or_exit, parse_time_or_exit, print_json, requester,
    submit_error_payload,
};
use formgate_kernel::Admission;
use serde_json::json;

pub fn run_access(form_id: Option<u64>, actor: ActorArgs, common: StoreArgs) {
    let service = open_service_or_exit(&common);
    let form_id = form_id_or_exit(&service, form_id, &actor);
    let capabilities = or_exit(service.resolve_access(&requester(&actor), form_id));

    if common.json {
        print_json(&json!({
            "action": "access",
            "formId": form_id,
            "capabilities": capabilities,
        }));
    } else {
        println!(
            "formgate access {form_id}\n  Capabilities: {}",
            capabilities.wire_names().join(", ")
        );
    }
}

pub fn run_accept(form_id: Option<u64>, at: Option<String>, actor: ActorArgs, common: StoreArgs) {
    let now = parse_time_or_exit(at.as_deref());
    let service = open_service_or_exit(&common);
    let form_id = form_id_or_exit(&service, form_id, &actor);
    let admission = or_exit(service.can_accept(&requester(&actor), form_id, now));

    if common.json {
        let mut payload = json!({
            "action": "accept",
            "formId": form_id,
            "at": now.to_rfc3339(),
            "accepted": admission.is_accepted(),
        });
        if let Admission::Reject(err) = &admission {
            payload["error"] = submit_error_payload(err);
        }
        print_json(&payload);
        return;
    }

    match admission {
        Admission::Accept => println!("formgate accept {form_id}\n  Accepted: yes"),
        Admission::Reject(err) => {
            println!("formgate accept {form_id}\n  Accepted: no\n  Reason: {err}")
        }
    }
}
