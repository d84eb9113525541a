use crate::cli::{ActorArgs, FormCommands, StoreArgs};
use crate::support::{
    form_id_or_exit, open_service_or_exit, or_exit, owner_or_exit, parse_time_or_exit,
    print_json, requester,
};
use formgate_kernel::{AccessFlags, Form, FormState};
use formgate_store::{FormRecord, NewForm};
use serde_json::json;

pub fn run(command: FormCommands) {
    match command {
        FormCommands::Create {
            title,
            expires,
            submit_multiple,
            anonymous,
            allow_edit,
            access,
            actor,
            common,
        } => run_create(
            NewForm {
                title,
                expires_at: expires.as_deref().map(|raw| parse_time_or_exit(Some(raw))),
                submit_multiple,
                is_anonymous: anonymous,
                allow_edit_submissions: allow_edit,
                access: or_exit(AccessFlags::from_wire(access)),
            },
            actor,
            common,
        ),

        FormCommands::State {
            form_id,
            state,
            actor,
            common,
        } => run_state(form_id, state, actor, common),

        FormCommands::Show {
            form_id,
            actor,
            common,
        } => run_show(form_id, actor, common),

        FormCommands::List { actor, common } => run_list(actor, common),
    }
}

fn summary(form: &Form) -> String {
    let expires = form
        .expires_at
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    format!(
        "{} [{}] {:?} owner={} expires={}",
        form.id,
        form.state.as_str(),
        form.title,
        form.owner,
        expires
    )
}

fn run_create(new_form: NewForm, actor: ActorArgs, common: StoreArgs) {
    let owner = owner_or_exit(&actor);
    let service = open_service_or_exit(&common);
    let form = or_exit(service.create_form(&owner, new_form));

    if common.json {
        print_json(&json!({
            "action": "form.create",
            "storePath": service.store_path().display().to_string(),
            "form": form,
        }));
    } else {
        println!(
            "formgate form create\n  Created: {}\n  Hash: {}\n  Path: {}",
            summary(&form),
            form.hash,
            service.store_path().display()
        );
    }
}

fn run_state(form_id: u64, state: FormState, actor: ActorArgs, common: StoreArgs) {
    let service = open_service_or_exit(&common);
    let form = or_exit(service.set_state(&requester(&actor), form_id, state));

    if common.json {
        print_json(&json!({
            "action": "form.state",
            "form": form,
        }));
    } else {
        println!("formgate form state\n  Form: {}", summary(&form));
    }
}

fn run_show(form_id: Option<u64>, actor: ActorArgs, common: StoreArgs) {
    let service = open_service_or_exit(&common);
    let form_id = form_id_or_exit(&service, form_id, &actor);
    let FormRecord {
        form,
        mut questions,
        shares,
    } = or_exit(service.form(&requester(&actor), form_id));
    questions.retain(|question| !question.deleted);
    questions.sort_by_key(|question| (question.order, question.id));

    if common.json {
        print_json(&json!({
            "action": "form.show",
            "form": form,
            "questions": questions,
            "shares": shares,
        }));
        return;
    }

    println!("formgate form show\n  Form: {}", summary(&form));
    for question in &questions {
        println!(
            "  Q{} #{} [{}{}] {}",
            question.order,
            question.id,
            question.question_type().as_str(),
            if question.is_required { ", required" } else { "" },
            question.text
        );
        for option in &question.options {
            println!("      option {}: {}", option.id, option.text);
        }
    }
    for share in &shares {
        println!(
            "  share {} {} {} [{}]",
            share.id,
            share.kind.as_str(),
            share.target,
            share.capabilities.wire_names().join(", ")
        );
    }
}

fn run_list(actor: ActorArgs, common: StoreArgs) {
    let service = open_service_or_exit(&common);
    let forms = or_exit(service.listed_forms(&requester(&actor)));

    if common.json {
        print_json(&json!({
            "action": "form.list",
            "count": forms.len(),
            "forms": forms,
        }));
        return;
    }

    println!("formgate form list ({} forms)", forms.len());
    for form in &forms {
        println!("  {}", summary(form));
    }
}
