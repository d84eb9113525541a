use crate::cli::MemberCommands;
use crate::support::{fail, open_service_or_exit, or_exit, print_json, yes_no};
use formgate_store::{Member, MembershipKind};
use serde_json::json;

fn member_or_exit(kind: &str, id: String) -> Member {
    if kind.trim() == "user" {
        return Member::User(id);
    }
    match kind.parse::<MembershipKind>() {
        Ok(container) => Member::container(container, id),
        Err(e) => fail(format!("{e}; members may also be `user`")),
    }
}

pub fn run(command: MemberCommands) {
    match command {
        MemberCommands::Add {
            kind,
            container,
            member,
            member_kind,
            common,
        } => {
            let member = member_or_exit(&member_kind, member);
            let service = open_service_or_exit(&common);
            let added = or_exit(service.add_member(kind, &container, member.clone()));

            if common.json {
                print_json(&json!({
                    "action": "member.add",
                    "kind": kind,
                    "container": container,
                    "member": member,
                    "added": added,
                }));
            } else {
                println!(
                    "formgate member add\n  {kind} {container}: {member:?}\n  Added: {}",
                    yes_no(added)
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_kinds_map_to_members() {
        assert_eq!(
            member_or_exit("user", "bob".to_string()),
            Member::User("bob".to_string())
        );
        assert_eq!(
            member_or_exit("circle", "board".to_string()),
            Member::container(MembershipKind::Circle, "board")
        );
    }
}
