use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use sv_security::{
    CategorySet, DetectionResult, Detector, MatchSpan, Masker, RegexDetector, decode_text,
};

#[derive(Debug, Serialize)]
struct ScanReport {
    path: String,
    decoded: bool,
    #[serde(flatten)]
    result: DetectionResult,
    spans: Vec<MatchSpan>,
}

fn build_report(path: &Path, bytes: &[u8]) -> ScanReport {
    let detector = RegexDetector::new();
    let text = decode_text(bytes);
    ScanReport {
        path: path.display().to_string(),
        decoded: text.is_some(),
        result: detector.detect_decoded(text),
        spans: text.map(|t| detector.find_spans(t)).unwrap_or_default(),
    }
}

pub async fn scan(path: &Path, json: bool) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let report = build_report(path, &bytes);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if !report.decoded {
        println!("{}: not UTF-8 text, skipped", report.path);
    } else if !report.result.has_sensitive_data {
        println!("✓ {}: no sensitive data", report.path);
    } else {
        println!(
            "⚠ {}: sensitive data found ({})",
            report.path,
            report.result.categories.to_list_string()
        );
        for span in &report.spans {
            println!(
                "  [{}] {}..{} {}",
                span.category, span.start, span.end, span.raw_text
            );
        }
    }

    Ok(())
}

pub async fn mask(path: &Path, categories: Option<&str>, json: bool) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let text = decode_text(&bytes)
        .with_context(|| format!("{} is not UTF-8 text", path.display()))?;

    let categories = match categories {
        Some(list) => CategorySet::parse_list(list),
        None => CategorySet::all(),
    };
    let result = Masker::new().mask(text, &categories);

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", result.text);
        if !result.text.ends_with('\n') {
            println!();
        }
        tracing::info!("{} redaction(s) applied", result.redactions.len());
    }

    Ok(())
}
