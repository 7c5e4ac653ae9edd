use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::helpers::{
    assigned, assigned_text, db_conn, delete_row, ensure_exists, insert_row, matches_search,
    new_id, optional_i64, optional_str, read_create, read_patch, required_str, set_assignment,
    update_row, Assignments, Field, FieldKind,
};
use crate::ipc::types::{AppState, Request};
use crate::rollup::{Gender, IncidentType};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;

const INCIDENT_STATES: &[&str] = &["none", "repeat", "dismissed", "medical_discharge"];

const STUDENT_FIELDS: &[Field] = &[
    Field::new("studentNo", "student_no", FieldKind::Text),
    Field::new("fullName", "full_name", FieldKind::Text),
    Field::new("collegeId", "college_id", FieldKind::OptText),
    Field::new("facultyId", "faculty_id", FieldKind::OptText),
    Field::new("program", "program", FieldKind::OptText),
    Field::new("year", "year", FieldKind::OptInt),
    Field::new(
        "gender",
        "gender",
        FieldKind::Enum {
            allowed: &Gender::ALL,
            default: None,
        },
    ),
    Field::new(
        "incidentType",
        "incident_type",
        FieldKind::Enum {
            allowed: INCIDENT_STATES,
            default: Some("none"),
        },
    ),
    Field::new("contactPhone", "contact_phone", FieldKind::OptText),
    Field::new("contactEmail", "contact_email", FieldKind::OptText),
];

const STUDENT_SELECT: &str = "SELECT
       s.id, s.student_no, s.full_name, s.college_id, c.college_name, s.faculty_id,
       f.faculty_name, s.program, s.year, s.gender, s.incident_type, s.contact_phone,
       s.contact_email, s.created_at, s.updated_at
     FROM students s
     LEFT JOIN colleges c ON c.id = s.college_id
     LEFT JOIN faculties f ON f.id = s.faculty_id";

fn student_json(r: &Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let id: String = r.get(0)?;
    let student_no: String = r.get(1)?;
    let full_name: String = r.get(2)?;
    let college_id: Option<String> = r.get(3)?;
    let college_name: Option<String> = r.get(4)?;
    let faculty_id: Option<String> = r.get(5)?;
    let faculty_name: Option<String> = r.get(6)?;
    let program: Option<String> = r.get(7)?;
    let year: Option<i64> = r.get(8)?;
    let gender: String = r.get(9)?;
    let incident_type: String = r.get(10)?;
    let contact_phone: Option<String> = r.get(11)?;
    let contact_email: Option<String> = r.get(12)?;
    let created_at: String = r.get(13)?;
    let updated_at: String = r.get(14)?;
    Ok(json!({
        "id": id,
        "studentNo": student_no,
        "fullName": full_name,
        "collegeId": college_id,
        "collegeName": college_name,
        "facultyId": faculty_id,
        "facultyName": faculty_name,
        "program": program,
        "year": year,
        "gender": gender,
        "incidentType": incident_type,
        "contactPhone": contact_phone,
        "contactEmail": contact_email,
        "createdAt": created_at,
        "updatedAt": updated_at
    }))
}

fn faculty_college(conn: &Connection, faculty_id: &str) -> Result<String, ApiError> {
    conn.query_row(
        "SELECT college_id FROM faculties WHERE id = ?",
        [faculty_id],
        |r| r.get(0),
    )
    .optional()?
    .ok_or(ApiError::NotFound("faculty"))
}

/// A student's college always matches their faculty's college.
///
/// Setting a faculty implies its college. Moving to another college without
/// naming a faculty drops a faculty that belongs elsewhere.
fn reconcile_placement(
    conn: &Connection,
    student_id: Option<&str>,
    cols: &mut Assignments,
) -> Result<(), ApiError> {
    if let Some(faculty_id) = assigned_text(cols, "faculty_id").map(str::to_string) {
        let owner = faculty_college(conn, &faculty_id)?;
        match assigned(cols, "college_id") {
            Some(Value::Text(college_id)) if *college_id != owner => {
                return Err(ApiError::bad_params(
                    "facultyId does not belong to collegeId",
                ));
            }
            _ => set_assignment(cols, "college_id", Value::Text(owner)),
        }
        return Ok(());
    }

    let Some(college) = assigned(cols, "college_id").cloned() else {
        return Ok(());
    };
    if let Value::Text(college_id) = &college {
        ensure_exists(conn, "colleges", college_id, "college")?;
    }
    if assigned(cols, "faculty_id").is_some() {
        return Ok(());
    }
    let Some(student_id) = student_id else {
        return Ok(());
    };
    let current_faculty_college: Option<String> = conn
        .query_row(
            "SELECT f.college_id FROM students s JOIN faculties f ON f.id = s.faculty_id WHERE s.id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()?;
    let keeps_faculty = matches!(
        (&college, current_faculty_college.as_deref()),
        (Value::Text(new), Some(cur)) if new == cur
    );
    if current_faculty_college.is_some() && !keeps_faculty {
        set_assignment(cols, "faculty_id", Value::Null);
    }
    Ok(())
}

fn handle_students_list(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let search = optional_str(req, "search")?;
    let college_id = optional_str(req, "collegeId")?;
    let faculty_id = optional_str(req, "facultyId")?;
    let year = optional_i64(req, "year")?;

    let sql = format!(
        "{}
         WHERE (?1 IS NULL OR s.college_id = ?1)
           AND (?2 IS NULL OR s.faculty_id = ?2)
           AND (?3 IS NULL OR s.year = ?3)
         ORDER BY s.full_name, s.student_no",
        STUDENT_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            (college_id.as_deref(), faculty_id.as_deref(), year),
            student_json,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    let students: Vec<serde_json::Value> = rows
        .into_iter()
        .filter(|s| {
            let field = |k: &str| s.get(k).and_then(|v| v.as_str()).unwrap_or("").to_string();
            let (name, no, program) = (field("fullName"), field("studentNo"), field("program"));
            matches_search(search.as_deref(), &[name.as_str(), no.as_str(), program.as_str()])
        })
        .collect();
    Ok(json!({ "students": students }))
}

fn handle_students_get(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let student_id = required_str(req, "studentId")?;
    let sql = format!("{} WHERE s.id = ?", STUDENT_SELECT);
    let student = conn
        .query_row(&sql, [&student_id], student_json)
        .optional()?
        .ok_or(ApiError::NotFound("student"))?;

    let mut stmt = conn.prepare(
        "SELECT id, incident_type, incident_date, reason
         FROM student_incidents
         WHERE student_id = ?
         ORDER BY incident_date DESC, created_at DESC",
    )?;
    let incidents = stmt
        .query_map([&student_id], |r| {
            let id: String = r.get(0)?;
            let incident_type: String = r.get(1)?;
            let incident_date: String = r.get(2)?;
            let reason: String = r.get(3)?;
            Ok(json!({
                "id": id,
                "incidentType": incident_type,
                "incidentDate": incident_date,
                "reason": reason
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "student": student, "incidents": incidents }))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let mut cols = read_create(&req.params, STUDENT_FIELDS)?;
    reconcile_placement(conn, None, &mut cols)?;
    let student_id = new_id();
    insert_row(conn, "students", &student_id, cols)?;
    tracing::info!(student_id = %student_id, "student created");
    Ok(json!({ "studentId": student_id }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let student_id = required_str(req, "studentId")?;
    let mut cols = read_patch(req, STUDENT_FIELDS)?;
    ensure_exists(conn, "students", &student_id, "student")?;
    reconcile_placement(conn, Some(&student_id), &mut cols)?;
    update_row(conn, "students", &student_id, "student", cols)?;
    Ok(json!({ "studentId": student_id }))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let student_id = required_str(req, "studentId")?;
    ensure_exists(conn, "students", &student_id, "student")?;

    let tx = conn.unchecked_transaction().map_err(ApiError::tx)?;
    let incidents = tx
        .execute(
            "DELETE FROM student_incidents WHERE student_id = ?",
            [&student_id],
        )
        .map_err(ApiError::delete("student_incidents"))?;
    let medical = tx
        .execute(
            "DELETE FROM medical_records WHERE student_id = ?",
            [&student_id],
        )
        .map_err(ApiError::delete("medical_records"))?;
    delete_row(&tx, "students", &student_id, "student")?;
    tx.commit().map_err(ApiError::tx)?;

    tracing::info!(student_id = %student_id, incidents, medical, "student deleted");
    Ok(json!({
        "studentId": student_id,
        "incidentsDeleted": incidents,
        "medicalRecordsDeleted": medical
    }))
}

/// Incident state the student row should show given its incident history.
pub fn latest_incident_state(conn: &Connection, student_id: &str) -> Result<IncidentType, ApiError> {
    let latest: Option<String> = conn
        .query_row(
            "SELECT incident_type FROM student_incidents
             WHERE student_id = ?
             ORDER BY incident_date DESC, created_at DESC
             LIMIT 1",
            [student_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(latest
        .as_deref()
        .and_then(IncidentType::parse)
        .unwrap_or(IncidentType::None))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => handle_students_list(state, req),
        "students.get" => handle_students_get(state, req),
        "students.create" => handle_students_create(state, req),
        "students.update" => handle_students_update(state, req),
        "students.delete" => handle_students_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
