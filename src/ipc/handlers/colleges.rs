use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::helpers::{
    assigned_text, db_conn, delete_row, ensure_exists, insert_row, new_id, now_ts, optional_str,
    read_create, read_patch, required_str, update_row, Field, FieldKind,
};
use crate::ipc::types::{AppState, Request};
use crate::rollup::{self, CollegeNode, FacultyNode, Gender, IncidentType, StudentRecord};
use rusqlite::Connection;
use serde_json::json;

const COLLEGE_FIELDS: &[Field] = &[
    Field::new("collegeName", "college_name", FieldKind::Text),
    Field::new("description", "description", FieldKind::OptText),
];

const FACULTY_FIELDS: &[Field] = &[
    Field::new("collegeId", "college_id", FieldKind::Text),
    Field::new("facultyName", "faculty_name", FieldKind::Text),
    Field::new("description", "description", FieldKind::OptText),
];

/// Snapshot of every student row in the shape the roll-up reads.
pub fn load_student_records(conn: &Connection) -> Result<Vec<StudentRecord>, ApiError> {
    let mut stmt = conn.prepare("SELECT faculty_id, year, gender, incident_type FROM students")?;
    let rows = stmt
        .query_map([], |r| {
            let gender: Option<String> = r.get(2)?;
            let incident: Option<String> = r.get(3)?;
            Ok(StudentRecord {
                faculty_id: r.get(0)?,
                year: r.get(1)?,
                gender: gender.as_deref().and_then(Gender::parse),
                incident: incident.as_deref().and_then(IncidentType::parse),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn load_college_nodes(conn: &Connection) -> Result<Vec<CollegeNode>, ApiError> {
    let mut stmt = conn.prepare("SELECT id, college_name FROM colleges ORDER BY college_name")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(CollegeNode {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn load_faculty_nodes(conn: &Connection) -> Result<Vec<FacultyNode>, ApiError> {
    let mut stmt = conn.prepare("SELECT id, college_id, faculty_name FROM faculties")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(FacultyNode {
                id: r.get(0)?,
                college_id: r.get(1)?,
                name: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// College -> faculty -> year tree, recomputed from the current tables.
pub fn college_tree(conn: &Connection) -> Result<Vec<rollup::CollegeRollup>, ApiError> {
    let records = load_student_records(conn)?;
    let by_faculty = rollup::aggregate(&records);
    let colleges = load_college_nodes(conn)?;
    let faculties = load_faculty_nodes(conn)?;
    Ok(rollup::nest_by_college(&colleges, &faculties, &by_faculty))
}

fn handle_colleges_list(state: &mut AppState, _req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    // Correlated subqueries so the counts don't multiply through joins.
    let mut stmt = conn.prepare(
        "SELECT
           c.id,
           c.college_name,
           c.description,
           (SELECT COUNT(*) FROM faculties f WHERE f.college_id = c.id) AS faculty_count,
           (SELECT COUNT(*) FROM students s WHERE s.college_id = c.id) AS student_count
         FROM colleges c
         ORDER BY c.college_name",
    )?;
    let colleges = stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let description: Option<String> = r.get(2)?;
            let faculty_count: i64 = r.get(3)?;
            let student_count: i64 = r.get(4)?;
            Ok(json!({
                "id": id,
                "collegeName": name,
                "description": description,
                "facultyCount": faculty_count,
                "studentCount": student_count
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "colleges": colleges }))
}

fn handle_colleges_create(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let cols = read_create(&req.params, COLLEGE_FIELDS)?;
    let college_id = new_id();
    insert_row(conn, "colleges", &college_id, cols)?;
    tracing::info!(college_id = %college_id, "college created");
    Ok(json!({ "collegeId": college_id }))
}

fn handle_colleges_update(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let college_id = required_str(req, "collegeId")?;
    let cols = read_patch(req, COLLEGE_FIELDS)?;
    update_row(conn, "colleges", &college_id, "college", cols)?;
    Ok(json!({ "collegeId": college_id }))
}

fn handle_colleges_delete(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let college_id = required_str(req, "collegeId")?;
    ensure_exists(conn, "colleges", &college_id, "college")?;

    let tx = conn.unchecked_transaction().map_err(ApiError::tx)?;
    // Students keep their rows but lose the placement.
    let detached = tx
        .execute(
            "UPDATE students
             SET college_id = NULL, faculty_id = NULL, updated_at = ?1
             WHERE college_id = ?2
                OR faculty_id IN (SELECT id FROM faculties WHERE college_id = ?2)",
            (now_ts(), &college_id),
        )
        .map_err(ApiError::update("students"))?;
    let faculties_deleted = tx
        .execute("DELETE FROM faculties WHERE college_id = ?", [&college_id])
        .map_err(ApiError::delete("faculties"))?;
    delete_row(&tx, "colleges", &college_id, "college")?;
    tx.commit().map_err(ApiError::tx)?;

    tracing::info!(
        college_id = %college_id,
        faculties_deleted,
        students_detached = detached,
        "college deleted"
    );
    Ok(json!({
        "collegeId": college_id,
        "facultiesDeleted": faculties_deleted,
        "studentsDetached": detached
    }))
}

fn handle_faculties_list(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let college_id = optional_str(req, "collegeId")?;
    let mut stmt = conn.prepare(
        "SELECT
           f.id,
           f.college_id,
           f.faculty_name,
           f.description,
           (SELECT COUNT(*) FROM students s WHERE s.faculty_id = f.id) AS student_count
         FROM faculties f
         WHERE ?1 IS NULL OR f.college_id = ?1
         ORDER BY f.faculty_name",
    )?;
    let faculties = stmt
        .query_map([college_id.as_deref()], |r| {
            let id: String = r.get(0)?;
            let college_id: String = r.get(1)?;
            let name: String = r.get(2)?;
            let description: Option<String> = r.get(3)?;
            let student_count: i64 = r.get(4)?;
            Ok(json!({
                "id": id,
                "collegeId": college_id,
                "facultyName": name,
                "description": description,
                "studentCount": student_count
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "faculties": faculties }))
}

fn handle_faculties_create(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let cols = read_create(&req.params, FACULTY_FIELDS)?;
    if let Some(college_id) = assigned_text(&cols, "college_id") {
        ensure_exists(conn, "colleges", college_id, "college")?;
    }
    let faculty_id = new_id();
    insert_row(conn, "faculties", &faculty_id, cols)?;
    tracing::info!(faculty_id = %faculty_id, "faculty created");
    Ok(json!({ "facultyId": faculty_id }))
}

fn handle_faculties_update(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let faculty_id = required_str(req, "facultyId")?;
    let cols = read_patch(req, FACULTY_FIELDS)?;
    ensure_exists(conn, "faculties", &faculty_id, "faculty")?;

    let moved_to = assigned_text(&cols, "college_id").map(str::to_string);
    if let Some(college_id) = moved_to.as_deref() {
        ensure_exists(conn, "colleges", college_id, "college")?;
    }

    let tx = conn.unchecked_transaction().map_err(ApiError::tx)?;
    update_row(&tx, "faculties", &faculty_id, "faculty", cols)?;
    if let Some(college_id) = moved_to {
        // Keep students' college in step with their faculty.
        tx.execute(
            "UPDATE students SET college_id = ?, updated_at = ? WHERE faculty_id = ?",
            (&college_id, now_ts(), &faculty_id),
        )
        .map_err(ApiError::update("students"))?;
    }
    tx.commit().map_err(ApiError::tx)?;
    Ok(json!({ "facultyId": faculty_id }))
}

fn handle_faculties_delete(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let faculty_id = required_str(req, "facultyId")?;
    ensure_exists(conn, "faculties", &faculty_id, "faculty")?;

    let tx = conn.unchecked_transaction().map_err(ApiError::tx)?;
    let detached = tx
        .execute(
            "UPDATE students SET faculty_id = NULL, updated_at = ? WHERE faculty_id = ?",
            (now_ts(), &faculty_id),
        )
        .map_err(ApiError::update("students"))?;
    delete_row(&tx, "faculties", &faculty_id, "faculty")?;
    tx.commit().map_err(ApiError::tx)?;
    Ok(json!({ "facultyId": faculty_id, "studentsDetached": detached }))
}

fn handle_colleges_stats(state: &mut AppState, _req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let records = load_student_records(conn)?;
    let stats = rollup::aggregate(&records);
    tracing::debug!(students = records.len(), faculties = stats.len(), "faculty stats rolled up");
    Ok(json!({ "statsByFaculty": stats }))
}

fn handle_colleges_tree(state: &mut AppState, _req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    Ok(json!({ "colleges": college_tree(conn)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "colleges.list" => handle_colleges_list(state, req),
        "colleges.create" => handle_colleges_create(state, req),
        "colleges.update" => handle_colleges_update(state, req),
        "colleges.delete" => handle_colleges_delete(state, req),
        "colleges.stats" => handle_colleges_stats(state, req),
        "colleges.tree" => handle_colleges_tree(state, req),
        "faculties.list" => handle_faculties_list(state, req),
        "faculties.create" => handle_faculties_create(state, req),
        "faculties.update" => handle_faculties_update(state, req),
        "faculties.delete" => handle_faculties_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
