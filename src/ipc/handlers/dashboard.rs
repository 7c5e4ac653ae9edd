use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::handlers::colleges::load_student_records;
use crate::ipc::helpers::{count, db_conn};
use crate::ipc::types::{AppState, Request};
use crate::rollup;
use rusqlite::Connection;
use serde_json::json;

/// Per-faculty student counts resolved to names, ordered by faculty name.
fn students_by_faculty(
    conn: &Connection,
    population: &rollup::PopulationSummary,
) -> Result<Vec<serde_json::Value>, ApiError> {
    let mut stmt = conn.prepare(
        "SELECT f.id, f.faculty_name, c.college_name
         FROM faculties f
         LEFT JOIN colleges c ON c.id = f.college_id
         ORDER BY f.faculty_name, c.college_name",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<String>>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .filter_map(|(id, name, college)| {
            let students = *population.by_faculty.get(&id)?;
            Some(json!({
                "facultyId": id,
                "facultyName": name,
                "collegeName": college,
                "students": students
            }))
        })
        .collect())
}

/// Headline counts for the landing view. Always read fresh.
pub fn summary(conn: &Connection) -> Result<serde_json::Value, ApiError> {
    let records = load_student_records(conn)?;
    let population = rollup::summarize_population(&records);
    let by_faculty_name = students_by_faculty(conn, &population)?;
    let n = |sql: &str| count(conn, sql, &[]);
    Ok(json!({
        "totalStudents": population.total,
        "totalStaff": n("SELECT COUNT(*) FROM staff")?,
        "totalColleges": n("SELECT COUNT(*) FROM colleges")?,
        "availableRooms": n("SELECT COUNT(*) FROM lecture_rooms WHERE status = 'available'")?,
        "activePatients": n("SELECT COUNT(*) FROM medical_records WHERE status = 'active'")?,
        "lowStockItems": n("SELECT COUNT(*) FROM materials WHERE status = 'low_stock'")?,
        "upcomingPractice": n("SELECT COUNT(*) FROM practice_sessions WHERE status = 'planned'")?,
        "pendingMessages": n("SELECT COUNT(*) FROM messages WHERE status = 'pending'")?,
        "studentsByFaculty": by_faculty_name,
        "population": population,
    }))
}

fn handle_dashboard_summary(state: &mut AppState, _req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    summary(conn)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "dashboard.summary" => handle_dashboard_summary(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
