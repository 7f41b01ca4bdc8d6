//! Subcommand: `maestro select` and the renderers it shares with the REPL.

use std::fmt::Write as _;

use anyhow::Result;
use maestro_kernel::{
    ComplexityAnalyzer, ComplexityReport, RuleTable, Selection, TaskPlan, plan_tasks,
};
use serde::Serialize;
use tracing::info;

use crate::runtime::App;

/// Full, serializable account of one selection.
#[derive(Debug, Serialize)]
pub struct SelectReport<'a> {
    pub session_id: &'a str,
    pub selection: &'a Selection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<ComplexityReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<TaskPlan>,
}

impl<'a> SelectReport<'a> {
    /// Selection only.
    pub fn brief(session_id: &'a str, selection: &'a Selection) -> Self {
        Self {
            session_id,
            selection,
            complexity: None,
            plan: None,
        }
    }

    /// Selection plus complexity score and task plan.
    pub fn detailed(
        session_id: &'a str,
        selection: &'a Selection,
        request: &str,
        analyzer: &ComplexityAnalyzer,
        table: &RuleTable,
    ) -> Self {
        let complexity = analyzer.analyze(request);
        let plan = plan_tasks(selection, table, complexity.pattern);
        Self {
            session_id,
            selection,
            complexity: Some(complexity),
            plan: Some(plan),
        }
    }
}

/// Route one request and print the result.
pub async fn cmd_select(
    app: &App,
    request: &str,
    verbose: bool,
    session_id: Option<&str>,
    json: bool,
) -> Result<()> {
    let mut session = app.open_session(session_id).await?;
    let selection = session.select(&app.selector, request).await?;
    info!(
        session = session.context().session_id(),
        primary = %selection.primary,
        reason = %selection.reason,
        "request routed"
    );

    let ctx = session.context();
    let report = if verbose {
        SelectReport::detailed(
            ctx.session_id(),
            &selection,
            request,
            &app.analyzer,
            app.selector.table(),
        )
    } else {
        SelectReport::brief(ctx.session_id(), &selection)
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_personas(&selection));
        if verbose {
            print!("{}", render_explanation(&report));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Selected persona ids, primary first, one per line.
pub fn render_personas(selection: &Selection) -> String {
    let mut out = String::new();
    for persona in selection.personas() {
        out.push_str(persona);
        out.push('\n');
    }
    out
}

/// Human-readable explanation of why these personas were chosen.
pub fn render_explanation(report: &SelectReport<'_>) -> String {
    let selection = report.selection;
    let mut out = String::new();

    let _ = writeln!(out);
    let _ = writeln!(out, "  session:     {}", report.session_id);
    let _ = writeln!(out, "  primary:     {} ({})", selection.primary, selection.reason);
    if selection.coordinated {
        let _ = writeln!(out, "  coordinated: {}", selection.secondary.join(", "));
        let _ = writeln!(out, "  cues:        {}", selection.cues.join(", "));
    }

    if selection.matches.is_empty() {
        let _ = writeln!(out, "  matches:     none, using the default persona");
    } else {
        let _ = writeln!(out, "  matches:");
        for m in &selection.matches {
            let _ = writeln!(
                out,
                "    {:<28} [{}] {}",
                m.persona_id,
                m.category,
                m.terms.join(", ")
            );
        }
    }

    if let Some(complexity) = &report.complexity {
        let i = complexity.indicators;
        let _ = writeln!(
            out,
            "  complexity:  {:.2} (domains {}, technical {}, actions {}, scope {})",
            complexity.score, i.multi_domain, i.technical, i.action, i.scope
        );
        let _ = writeln!(out, "  pattern:     {}", complexity.pattern.as_str());
    }

    if let Some(plan) = &report.plan {
        let _ = writeln!(out, "  plan (~{} min):", plan.estimated_minutes);
        for task in &plan.subtasks {
            let after = if task.depends_on.is_empty() {
                String::new()
            } else {
                format!(" after {}", task.depends_on.join(", "))
            };
            let _ = writeln!(
                out,
                "    {:<16} L{} {:<24} {}{}",
                task.id, task.level, task.persona, task.description, after
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use maestro_kernel::{ConversationContext, ExpertSelector, SelectorConfig};

    use super::*;

    fn selector() -> ExpertSelector {
        ExpertSelector::new(RuleTable::builtin().unwrap(), SelectorConfig::default()).unwrap()
    }

    #[test]
    fn personas_render_primary_first() {
        let selector = selector();
        let mut ctx = ConversationContext::new("t");
        let selection = selector
            .select("Build a full-stack app with React and Python", &mut ctx)
            .unwrap();
        let rendered = render_personas(&selection);
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], selection.primary);
        assert!(lines.contains(&"react-expert"));
        assert!(lines.contains(&"python-expert"));
    }

    #[test]
    fn fallback_is_explained() {
        let selector = selector();
        let mut ctx = ConversationContext::new("t");
        let selection = selector.select("asdkjfh qwoeiru", &mut ctx).unwrap();
        let text = render_explanation(&SelectReport::brief("t", &selection));
        assert!(text.contains("frontend-design (fallback)"));
        assert!(text.contains("none, using the default persona"));
    }

    #[test]
    fn detailed_report_includes_plan() {
        let selector = selector();
        let analyzer = ComplexityAnalyzer::new().unwrap();
        let mut ctx = ConversationContext::new("t");
        let request = "Create a React component";
        let selection = selector.select(request, &mut ctx).unwrap();
        let report =
            SelectReport::detailed("t", &selection, request, &analyzer, selector.table());

        let text = render_explanation(&report);
        assert!(text.contains("react-expert (single_match)"));
        assert!(text.contains("complexity:"));
        assert!(text.contains("plan (~"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["selection"]["primary"], "react-expert");
        assert!(json["plan"]["subtasks"].is_array());
    }
}
