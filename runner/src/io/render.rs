//! Plain-text step cards rendered with minijinja.

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};

use crate::lab::Step;
use crate::session::Session;

const STEP_TEMPLATE: &str = include_str!("templates/step.md");

/// Template engine wrapper around minijinja.
pub struct CardRenderer {
    env: Environment<'static>,
}

impl CardRenderer {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.add_template("step", STEP_TEMPLATE)
            .context("step card template")?;
        Ok(Self { env })
    }

    pub fn render_step(&self, index: usize, step: &Step, status: Option<&str>) -> Result<String> {
        let template = self.env.get_template("step")?;
        let rendered = template.render(context! {
            index => index,
            step => step,
            status => status,
        })?;
        Ok(rendered.trim_end().to_string())
    }

    /// Render every step of the session's lab, or only `only`.
    pub fn render_session(&self, session: &Session, only: Option<&str>) -> Result<String> {
        let lab = session.lab();
        let mut cards = Vec::new();
        for (position, step) in lab.steps.iter().enumerate() {
            if only.is_some_and(|id| id != step.id) {
                continue;
            }
            let status = if session.current_step_id() == step.id {
                Some("current")
            } else if session.progress(&step.id).is_some_and(|progress| progress.completed) {
                Some("completed")
            } else {
                None
            };
            cards.push(self.render_step(position + 1, step, status)?);
        }
        if let Some(id) = only
            && cards.is_empty()
        {
            return Err(anyhow!("unknown step '{id}'"));
        }
        let title = if lab.title.is_empty() { &lab.id } else { &lab.title };
        Ok(format!(
            "# {title}\n\nScore: {}/{}\n\n{}\n",
            session.score(),
            session.max_score(),
            cards.join("\n\n")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::PlayerConfig;
    use crate::test_support::{lab_doc, quiz_step, terminal_step};

    fn session() -> Session {
        let mut quiz = quiz_step("q", &["a", "b"], "a", 5);
        quiz.hints = vec!["Think about it".to_string()];
        Session::new(&lab_doc(vec![terminal_step("t", "echo hi", 10), quiz]), "seed", PlayerConfig::default())
    }

    #[test]
    fn renders_quiz_choices_and_hints() {
        let renderer = CardRenderer::new().expect("renderer");
        let out = renderer.render_session(&session(), Some("q")).expect("render");
        assert!(out.starts_with("# Test lab"), "{out}");
        assert!(out.contains("## 2. q title (quiz, 5 pts)"), "{out}");
        assert!(out.contains("- [a] A"), "{out}");
        assert!(out.contains("- Think about it"), "{out}");
        assert!(!out.contains("t title"), "{out}");
    }

    #[test]
    fn marks_current_step() {
        let renderer = CardRenderer::new().expect("renderer");
        let out = renderer.render_session(&session(), None).expect("render");
        assert!(out.contains("_Status: current_"), "{out}");
        assert!(out.contains("Prompt: `$`"), "{out}");
    }

    #[test]
    fn unknown_step_is_an_error() {
        let renderer = CardRenderer::new().expect("renderer");
        assert!(renderer.render_session(&session(), Some("zzz")).is_err());
    }
}
