use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::{section_bool, section_i64, SetupSection};
use crate::ipc::helpers::{calc_err, db_conn, parse_viewer};
use crate::ipc::types::{AppState, Request};
use crate::records::{self, LoadedResult, ResultScope, Role, Viewer};
use rusqlite::Connection;
use serde_json::json;

const DEFAULT_PAGE_SIZE: i64 = 10;

fn parse_page(v: Option<&serde_json::Value>) -> Result<usize, String> {
    let Some(v) = v else {
        return Ok(1);
    };
    if v.is_null() {
        return Ok(1);
    }
    let Some(n) = v.as_u64() else {
        return Err("page must be a positive integer".to_string());
    };
    if n == 0 {
        return Err("page must be a positive integer".to_string());
    }
    Ok(n as usize)
}

fn parse_search(v: Option<&serde_json::Value>) -> Result<Option<String>, String> {
    let Some(v) = v else { return Ok(None) };
    if v.is_null() {
        return Ok(None);
    }
    let Some(s) = v.as_str() else {
        return Err("search must be a string".to_string());
    };
    let t = s.trim();
    if t.is_empty() {
        Ok(None)
    } else {
        Ok(Some(t.to_lowercase()))
    }
}

fn matches_search(item: &LoadedResult, needle: &str) -> bool {
    let title_hit = item
        .scored
        .assessment
        .as_ref()
        .map(|a| a.title.to_lowercase().contains(needle))
        .unwrap_or(false);
    title_hit || item.student_name.to_lowercase().contains(needle)
}

fn paginate_values<T: Clone>(items: &[T], page: usize, page_size: usize) -> Vec<T> {
    let start = page.saturating_sub(1).saturating_mul(page_size);
    if start >= items.len() {
        return Vec::new();
    }
    let end = (start + page_size).min(items.len());
    items[start..end].to_vec()
}

/// The banner a student sees above their results. Always computed over the
/// student's full result set, never over the current page.
fn student_summary(
    conn: &Connection,
    viewer: &Viewer,
    loaded: &[LoadedResult],
) -> Result<Option<serde_json::Value>, calc::CalcError> {
    if viewer.role != Role::Student {
        return Ok(None);
    }
    let student = match records::load_student(conn, &viewer.user_id) {
        Ok(s) => s,
        Err(e) if e.code == "not_found" => {
            tracing::warn!(student_id = %viewer.user_id, "student viewer has no student record");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    let summary = calc::credit_summary(student.required_credits, loaded.iter().map(|r| &r.scored));
    let show_outstanding = section_bool(conn, SetupSection::Grading, "showOutstandingCredits", true)
        .map_err(|e| calc::CalcError::new("db_query_failed", e.to_string()))?;
    let mut out = json!(summary);
    if show_outstanding {
        out["outstanding"] = json!(summary.outstanding());
    }
    Ok(Some(out))
}

fn handle_results_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let viewer = match parse_viewer(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let page = match parse_page(req.params.get("page")) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let search = match parse_search(req.params.get("search")) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let student_filter = req
        .params
        .get("studentId")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let page_size = match section_i64(conn, SetupSection::Results, "pageSize", DEFAULT_PAGE_SIZE) {
        Ok(v) => v.max(1) as usize,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let scope = ResultScope::for_viewer(&viewer);
    let loaded = match records::load_results(conn, &scope) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };
    let summary = match student_summary(conn, &viewer, &loaded) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };

    let listed: Vec<LoadedResult> = loaded
        .into_iter()
        .filter(|r| r.scored.assessment.is_some())
        .filter(|r| student_filter.map(|s| r.scored.student_id == s).unwrap_or(true))
        .filter(|r| search.as_deref().map(|n| matches_search(r, n)).unwrap_or(true))
        .collect();
    let count = listed.len();

    let rows: Vec<serde_json::Value> = paginate_values(&listed, page, page_size)
        .iter()
        .filter_map(|r| {
            let a = r.scored.assessment.as_ref()?;
            Some(json!({
                "id": r.scored.id,
                "title": a.title,
                "kind": a.kind.as_str(),
                "studentId": r.scored.student_id,
                "studentName": r.student_name,
                "score": r.scored.score,
                "teacherId": a.teacher_id,
                "date": a.date,
                "credits": calc::awarded_credits(&r.scored, a.subject_credit, &a.subject_id),
            }))
        })
        .collect();

    tracing::debug!(role = viewer.role.as_str(), count, page, "results listed");
    ok(
        &req.id,
        json!({
            "rows": rows,
            "count": count,
            "page": page,
            "pageSize": page_size,
            "summary": summary,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.list" => Some(handle_results_list(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_clamps_to_available_rows() {
        let items: Vec<i32> = (1..=12).collect();
        assert_eq!(paginate_values(&items, 1, 5), vec![1, 2, 3, 4, 5]);
        assert_eq!(paginate_values(&items, 3, 5), vec![11, 12]);
        assert!(paginate_values(&items, 4, 5).is_empty());
    }

    #[test]
    fn page_and_search_parsing() {
        assert_eq!(parse_page(None), Ok(1));
        assert_eq!(parse_page(Some(&json!(3))), Ok(3));
        assert!(parse_page(Some(&json!(0))).is_err());
        assert!(parse_page(Some(&json!("2"))).is_err());
        assert_eq!(parse_search(Some(&json!("  MidTerm "))), Ok(Some("midterm".to_string())));
        assert_eq!(parse_search(Some(&json!(""))), Ok(None));
    }
}
