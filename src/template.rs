//! Text rendered into agent sessions: mail banners and initial-task prompts.

use minijinja::{Environment, context};

const MAIL_BANNER: &str = "📬 New mail from {{ from }}: {{ subject }}";

const INITIAL_TASK: &str = "\
You are {{ agent }}{% if rig %} in rig {{ rig }}{% endif %}. \
Your assignment is {{ task }}. \
Run `bd show {{ task }}` for details, then start working.";

fn env() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env
}

fn render(name: &'static str, source: &'static str, ctx: minijinja::Value) -> anyhow::Result<String> {
    let mut env = env();
    env.add_template(name, source)?;
    let tmpl = env.get_template(name)?;
    Ok(tmpl.render(ctx)?)
}

/// One-line notice pushed into a recipient's session after mail lands.
pub fn mail_banner(from: &str, subject: &str) -> anyhow::Result<String> {
    render("mail_banner", MAIL_BANNER, context! { from, subject })
}

/// Prompt injected into a freshly started session that was given a task.
pub fn initial_task(agent: &str, rig: Option<&str>, task: &str) -> anyhow::Result<String> {
    render("initial_task", INITIAL_TASK, context! { agent, rig, task })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_has_sender_and_subject() {
        let text = mail_banner("mayor", "Ship it").unwrap();
        assert_eq!(text, "📬 New mail from mayor: Ship it");
    }

    #[test]
    fn banner_does_not_escape() {
        let text = mail_banner("wyvern/Toast", "a <b> & c").unwrap();
        assert!(text.ends_with("a <b> & c"));
    }

    #[test]
    fn initial_task_with_rig() {
        let text = initial_task("wyvern/Toast", Some("wyvern"), "gt-123").unwrap();
        assert!(text.starts_with("You are wyvern/Toast in rig wyvern."));
        assert!(text.contains("bd show gt-123"));
    }

    #[test]
    fn initial_task_without_rig() {
        let text = initial_task("mayor", None, "gt-9").unwrap();
        assert!(text.starts_with("You are mayor. Your assignment is gt-9."));
    }
}
