//! Dashboard aggregates and their CSV / HTML exports.

use axum::{
    Json,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Months, Utc};

use murmur_db::models::ComplaintCounts;
use murmur_types::api::{AnalyticsQuery, AnalyticsRange, AnalyticsReport, CountEntry, ExportFormat};
use murmur_types::{Category, Priority, Status};

use crate::error::{AppError, AppResult};
use crate::session::{Authorized, StaffOnly};
use crate::state::AppState;

/// Start of the reporting window ending at `now`.
pub fn window_start(range: AnalyticsRange, now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(range.months()))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// One entry per enum value, in declaration order, missing values as zero.
fn zero_filled<K>(all: &[K], counts: &[(String, u64)], as_str: fn(K) -> &'static str) -> Vec<CountEntry<K>>
where
    K: Copy,
{
    all.iter()
        .map(|&key| CountEntry {
            key,
            count: counts
                .iter()
                .find(|(stored, _)| stored == as_str(key))
                .map_or(0, |(_, n)| *n),
        })
        .collect()
}

pub fn build_report(range: AnalyticsRange, since: DateTime<Utc>, counts: &ComplaintCounts) -> AnalyticsReport {
    AnalyticsReport {
        range,
        since,
        total: counts.total,
        by_category: zero_filled(Category::ALL, &counts.by_category, Category::as_str),
        by_status: zero_filled(Status::ALL, &counts.by_status, Status::as_str),
        by_priority: zero_filled(Priority::ALL, &counts.by_priority, Priority::as_str),
    }
}

async fn load_report(state: &AppState, range: AnalyticsRange) -> AppResult<AnalyticsReport> {
    let since = window_start(range, Utc::now());
    let stamp = murmur_db::timestamp::format(since);
    let counts = state
        .run_db(move |db| db.complaint_counts_since(&stamp))
        .await?;
    Ok(build_report(range, since, &counts))
}

/// GET /api/admin/analytics
pub async fn report(
    State(state): State<AppState>,
    _auth: Authorized<StaffOnly>,
    WithRejection(Query(query), _): WithRejection<Query<AnalyticsQuery>, AppError>,
) -> AppResult<Json<AnalyticsReport>> {
    Ok(Json(load_report(&state, query.range).await?))
}

/// GET /api/admin/analytics/export
pub async fn export(
    State(state): State<AppState>,
    _auth: Authorized<StaffOnly>,
    WithRejection(Query(query), _): WithRejection<Query<AnalyticsQuery>, AppError>,
) -> AppResult<Response> {
    let report = load_report(&state, query.range).await?;
    let stamp = report.since.format("%Y%m%d");

    let (content_type, extension, body) = match query.format {
        ExportFormat::Csv => ("text/csv; charset=utf-8", "csv", render_csv(&report)),
        ExportFormat::Html => ("text/html; charset=utf-8", "html", render_html(&report)),
    };
    let disposition = format!("attachment; filename=\"complaint-report-{stamp}.{extension}\"");

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

fn sections(report: &AnalyticsReport) -> [(&'static str, Vec<(&'static str, u64)>); 3] {
    [
        (
            "Category",
            report.by_category.iter().map(|e| (e.key.as_str(), e.count)).collect(),
        ),
        (
            "Status",
            report.by_status.iter().map(|e| (e.key.as_str(), e.count)).collect(),
        ),
        (
            "Priority",
            report.by_priority.iter().map(|e| (e.key.as_str(), e.count)).collect(),
        ),
    ]
}

pub fn render_csv(report: &AnalyticsReport) -> String {
    let mut out = String::new();
    out.push_str("section,key,count\r\n");
    out.push_str(&format!("Total,{},{}\r\n", csv_field(report.range.label()), report.total));
    for (section, entries) in sections(report) {
        for (key, count) in entries {
            out.push_str(&format!("{},{},{}\r\n", section, csv_field(key), count));
        }
    }
    out
}

pub fn render_html(report: &AnalyticsReport) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">");
    out.push_str("<title>Complaint report</title>");
    out.push_str("<style>body{font-family:sans-serif}table{border-collapse:collapse;margin-bottom:1.5em}td,th{border:1px solid #999;padding:4px 10px;text-align:left}</style>");
    out.push_str("</head><body>\n");
    out.push_str(&format!(
        "<h1>Complaint report</h1>\n<p>Period: last {} (since {})</p>\n<p>Total complaints: {}</p>\n",
        html_escape(report.range.label()),
        report.since.format("%Y-%m-%d"),
        report.total
    ));
    for (section, entries) in sections(report) {
        out.push_str(&format!(
            "<h2>{0}</h2>\n<table><tr><th>{0}</th><th>Count</th></tr>\n",
            html_escape(section)
        ));
        for (key, count) in entries {
            out.push_str(&format!("<tr><td>{}</td><td>{}</td></tr>\n", html_escape(key), count));
        }
        out.push_str("</table>\n");
    }
    out.push_str("</body></html>\n");
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn html_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
