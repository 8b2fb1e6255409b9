//! Final report rendering: Markdown, JSON, and standalone HTML.

use std::fmt::Write as _;

use panorama_core::FinalReport;
use serde_json::Value;

/// Output format for a rendered report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Markdown,
    Json,
    Html,
}

/// Render a final report in the requested format.
pub fn render_report(report: &FinalReport, format: ReportFormat) -> anyhow::Result<String> {
    match format {
        ReportFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        ReportFormat::Markdown => Ok(render_markdown(report)),
        ReportFormat::Html => Ok(render_html(report)),
    }
}

fn render_markdown(report: &FinalReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Market Analysis: {}\n", report.segment);
    let _ = writeln!(out, "- Quality score: **{}**", report.quality_score);
    let _ = writeln!(
        out,
        "- Completed: {} ({} ms, {} stages)",
        report.metadata.completed_at.format("%Y-%m-%d %H:%M UTC"),
        report.metadata.duration_ms,
        report.metadata.stages_executed
    );
    for (category, provider) in &report.metadata.providers_used {
        let _ = writeln!(out, "- Provider ({}): {}", category, provider);
    }
    let _ = writeln!(out);

    if let Some(synthesis) = report.sections.get("synthesis") {
        let _ = writeln!(out, "## Market Synthesis\n");
        if let Some(positioning) = str_field(synthesis, "positioning") {
            let _ = writeln!(out, "**Positioning.** {}\n", positioning);
        }
        if let Some(overview) = str_field(synthesis, "market_overview") {
            let _ = writeln!(out, "{}\n", overview);
        }
        if let Some(landscape) = str_field(synthesis, "competitive_landscape") {
            let _ = writeln!(out, "### Competitive Landscape\n\n{}\n", landscape);
        }
        write_str_list(&mut out, "### Opportunities", synthesis, "opportunities");
        write_str_list(&mut out, "### Risks", synthesis, "risks");
    }

    if let Some(drivers) = report.sections.get("drivers").and_then(|s| s.get("drivers")) {
        let _ = writeln!(out, "## Purchase Drivers\n");
        for driver in items(drivers) {
            let _ = writeln!(
                out,
                "- **{}**: triggered by {}. Apply with {}",
                str_field(driver, "name").unwrap_or("?"),
                str_field(driver, "trigger").unwrap_or("?"),
                str_field(driver, "application").unwrap_or("?")
            );
        }
        let _ = writeln!(out);
    }

    if let Some(objections) = report
        .sections
        .get("objections")
        .and_then(|s| s.get("objections"))
    {
        let _ = writeln!(out, "## Objection Handling\n");
        for objection in items(objections) {
            let _ = writeln!(
                out,
                "- **{}** ({}): {}",
                str_field(objection, "objection").unwrap_or("?"),
                str_field(objection, "category").unwrap_or("?"),
                str_field(objection, "counter").unwrap_or("?")
            );
        }
        let _ = writeln!(out);
    }

    if let Some(forecast) = report.sections.get("forecast") {
        let _ = writeln!(out, "## Forecast\n");
        if let Some(scenarios) = forecast.get("scenarios") {
            for scenario in items(scenarios) {
                let _ = writeln!(
                    out,
                    "- **{}** ({} months, confidence {}): {}",
                    str_field(scenario, "name").unwrap_or("?"),
                    scenario
                        .get("horizon_months")
                        .and_then(Value::as_u64)
                        .unwrap_or(0),
                    scenario
                        .get("confidence")
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0),
                    str_field(scenario, "outlook").unwrap_or("?")
                );
            }
            let _ = writeln!(out);
        }
        write_str_list(&mut out, "### Signals to Watch", forecast, "signals");
    }

    if let Some(research) = report.sections.get("research") {
        let _ = writeln!(out, "## Sources\n");
        if let Some(stats) = research.get("statistics") {
            let _ = writeln!(
                out,
                "{} sources across {} domains, {} characters of evidence.\n",
                stats
                    .get("total_sources")
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
                stats
                    .get("unique_domains")
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
                stats
                    .get("total_content_chars")
                    .and_then(Value::as_u64)
                    .unwrap_or(0)
            );
        }
        if let Some(sources) = research.get("sources") {
            for source in items(sources) {
                let _ = writeln!(
                    out,
                    "- [{}]({})",
                    str_field(source, "title").unwrap_or("?"),
                    str_field(source, "url").unwrap_or("?")
                );
            }
        }
    }

    if !report.metadata.warnings.is_empty() {
        let _ = writeln!(out, "\n## Warnings\n");
        for warning in &report.metadata.warnings {
            let _ = writeln!(out, "- {}", warning);
        }
    }

    out
}

fn render_html(report: &FinalReport) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "<h1>Market Analysis: {}</h1>", esc(&report.segment));
    let _ = writeln!(
        body,
        "<p class=\"meta\">Quality score <strong>{}</strong>, {} stages, {} ms</p>",
        report.quality_score, report.metadata.stages_executed, report.metadata.duration_ms
    );

    if let Some(synthesis) = report.sections.get("synthesis") {
        let _ = writeln!(body, "<h2>Market Synthesis</h2>");
        if let Some(positioning) = str_field(synthesis, "positioning") {
            let _ = writeln!(body, "<p><strong>{}</strong></p>", esc(positioning));
        }
        if let Some(overview) = str_field(synthesis, "market_overview") {
            let _ = writeln!(body, "<p>{}</p>", esc(overview));
        }
        if let Some(landscape) = str_field(synthesis, "competitive_landscape") {
            let _ = writeln!(body, "<h3>Competitive Landscape</h3>");
            let _ = writeln!(body, "<p>{}</p>", esc(landscape));
        }
        html_str_list(&mut body, "Opportunities", synthesis, "opportunities");
        html_str_list(&mut body, "Risks", synthesis, "risks");
    }

    if let Some(drivers) = report.sections.get("drivers").and_then(|s| s.get("drivers")) {
        let _ = writeln!(body, "<h2>Purchase Drivers</h2>\n<ul>");
        for driver in items(drivers) {
            let _ = writeln!(
                body,
                "<li><strong>{}</strong>: {} ({})</li>",
                esc(str_field(driver, "name").unwrap_or("?")),
                esc(str_field(driver, "trigger").unwrap_or("?")),
                esc(str_field(driver, "application").unwrap_or("?"))
            );
        }
        let _ = writeln!(body, "</ul>");
    }

    if let Some(objections) = report
        .sections
        .get("objections")
        .and_then(|s| s.get("objections"))
    {
        let _ = writeln!(body, "<h2>Objection Handling</h2>\n<ul>");
        for objection in items(objections) {
            let _ = writeln!(
                body,
                "<li><strong>{}</strong>: {}</li>",
                esc(str_field(objection, "objection").unwrap_or("?")),
                esc(str_field(objection, "counter").unwrap_or("?"))
            );
        }
        let _ = writeln!(body, "</ul>");
    }

    if let Some(forecast) = report.sections.get("forecast") {
        let _ = writeln!(body, "<h2>Forecast</h2>\n<ul>");
        if let Some(scenarios) = forecast.get("scenarios") {
            for scenario in items(scenarios) {
                let _ = writeln!(
                    body,
                    "<li><strong>{}</strong>: {}</li>",
                    esc(str_field(scenario, "name").unwrap_or("?")),
                    esc(str_field(scenario, "outlook").unwrap_or("?"))
                );
            }
        }
        let _ = writeln!(body, "</ul>");
    }

    if let Some(sources) = report.sections.get("research").and_then(|s| s.get("sources")) {
        let _ = writeln!(body, "<h2>Sources</h2>\n<ul>");
        for source in items(sources) {
            let _ = writeln!(
                body,
                "<li><a href=\"{}\">{}</a></li>",
                esc(str_field(source, "url").unwrap_or("#")),
                esc(str_field(source, "title").unwrap_or("?"))
            );
        }
        let _ = writeln!(body, "</ul>");
    }

    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Market Analysis: {}</title>\n\
         <style>body{{font-family:sans-serif;max-width:48rem;margin:2rem auto;\
         line-height:1.5;padding:0 1rem}}.meta{{color:#555}}</style>\n\
         </head>\n<body>\n{}</body>\n</html>\n",
        esc(&report.segment),
        body
    )
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn items(value: &Value) -> impl Iterator<Item = &Value> {
    value.as_array().map(|v| v.iter()).into_iter().flatten()
}

fn write_str_list(out: &mut String, heading: &str, section: &Value, key: &str) {
    let entries: Vec<&str> = section
        .get(key)
        .map(items)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect();
    if entries.is_empty() {
        return;
    }
    let _ = writeln!(out, "{}\n", heading);
    for entry in entries {
        let _ = writeln!(out, "- {}", entry);
    }
    let _ = writeln!(out);
}

fn html_str_list(body: &mut String, heading: &str, section: &Value, key: &str) {
    let entries: Vec<&str> = section
        .get(key)
        .map(items)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect();
    if entries.is_empty() {
        return;
    }
    let _ = writeln!(body, "<h3>{}</h3>\n<ul>", esc(heading));
    for entry in entries {
        let _ = writeln!(body, "<li>{}</li>", esc(entry));
    }
    let _ = writeln!(body, "</ul>");
}

fn esc(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
