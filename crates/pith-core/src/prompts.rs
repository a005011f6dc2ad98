use pith_store::{AgentProfile, UserProfile};

const BOOTSTRAP_TEMPLATE: &str = "\
You are in bootstrap mode. Your agent profile and the user's profile are \
incomplete. Before doing anything else, get to know the user: ask who they \
are, how they'd like to be addressed, and their timezone, and settle your \
own name, nature, vibe, and a representative emoji. Call the `set_profile` \
tool as soon as you have a field's value — do not wait to collect \
everything before saving. Once every required field on both profiles is \
set, bootstrap ends automatically and you continue as normal.";

const NORMAL_TEMPLATE: &str = "\
You are a long-running personal agent with access to a memory store and a \
set of tools. Use `memory_search` before assuming you don't know something \
about the user or yourself, and `memory_save` when you learn something \
worth keeping. Prefer your built-in file and search tools over asking the \
user to do things manually.";

/// Picks the bootstrap or normal system prompt template per the Context
/// Assembler's step 1: bootstrap applies whenever `bootstrap_complete` is
/// false OR either profile is still missing a required field, regardless
/// of which.
pub fn select_system_prompt(bootstrap_complete: bool, agent: &AgentProfile, user: &UserProfile) -> &'static str {
    if !bootstrap_complete || !agent.required_fields_complete() || !user.required_fields_complete() {
        BOOTSTRAP_TEMPLATE
    } else {
        NORMAL_TEMPLATE
    }
}

/// Renders a compact, single-paragraph-per-profile summary frame injected
/// after the persona document (Context Assembler step 3). Empty fields are
/// omitted rather than printed as blanks.
pub fn render_profile_summary(agent: &AgentProfile, user: &UserProfile) -> String {
    let mut out = String::from("Profile summary:\n");
    out.push_str(&format!(
        "- Agent: name={:?} nature={:?} vibe={:?} emoji={:?}\n",
        non_empty(&agent.name),
        non_empty(&agent.nature),
        non_empty(&agent.vibe),
        non_empty(&agent.emoji),
    ));
    if !agent.notes.is_empty() {
        out.push_str(&format!("  notes: {}\n", agent.notes));
    }
    out.push_str(&format!(
        "- User: name={:?} preferred_address={:?} timezone={:?}\n",
        non_empty(&user.name),
        non_empty(&user.preferred_address),
        non_empty(&user.timezone),
    ));
    if !user.notes.is_empty() {
        out.push_str(&format!("  notes: {}\n", user.notes));
    }
    out
}

fn non_empty(s: &str) -> &str {
    if s.is_empty() {
        "(unset)"
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_agent() -> AgentProfile {
        AgentProfile { name: "pith".into(), nature: "helpful".into(), vibe: "calm".into(), emoji: "🌱".into(), notes: String::new() }
    }

    fn complete_user() -> UserProfile {
        UserProfile { name: "Ada".into(), preferred_address: "Ada".into(), timezone: "UTC".into(), notes: String::new() }
    }

    #[test]
    fn bootstrap_selected_when_incomplete() {
        let agent = AgentProfile::default();
        let user = UserProfile::default();
        assert_eq!(select_system_prompt(false, &agent, &user), BOOTSTRAP_TEMPLATE);
    }

    #[test]
    fn bootstrap_selected_when_flag_false_even_if_profiles_complete() {
        assert_eq!(select_system_prompt(false, &complete_agent(), &complete_user()), BOOTSTRAP_TEMPLATE);
    }

    #[test]
    fn normal_selected_when_flag_true_and_profiles_complete() {
        assert_eq!(select_system_prompt(true, &complete_agent(), &complete_user()), NORMAL_TEMPLATE);
    }

    #[test]
    fn summary_omits_empty_notes() {
        let summary = render_profile_summary(&complete_agent(), &complete_user());
        assert!(!summary.contains("notes:"));
    }

    #[test]
    fn summary_marks_unset_fields() {
        let summary = render_profile_summary(&AgentProfile::default(), &UserProfile::default());
        assert!(summary.contains("(unset)"));
    }
}
