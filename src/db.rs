use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "campus.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("create workspace dir {}", workspace.display()))?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("open {}", db_path.display()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS colleges(
            id TEXT PRIMARY KEY,
            college_name TEXT NOT NULL UNIQUE,
            description TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS faculties(
            id TEXT PRIMARY KEY,
            college_id TEXT NOT NULL,
            faculty_name TEXT NOT NULL,
            description TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(college_id) REFERENCES colleges(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_faculties_college ON faculties(college_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            student_no TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL,
            college_id TEXT,
            faculty_id TEXT,
            program TEXT,
            year INTEGER,
            gender TEXT NOT NULL,
            contact_phone TEXT,
            contact_email TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(college_id) REFERENCES colleges(id),
            FOREIGN KEY(faculty_id) REFERENCES faculties(id)
        )",
        [],
    )?;
    // Workspaces created before incidents were tracked have no incident_type column.
    ensure_students_incident_type(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_faculty ON students(faculty_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_college ON students(college_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS staff(
            id TEXT PRIMARY KEY,
            staff_no TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL,
            position TEXT NOT NULL,
            department TEXT NOT NULL,
            contact_phone TEXT,
            contact_email TEXT,
            hostel_room TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lecture_rooms(
            id TEXT PRIMARY KEY,
            room_name TEXT NOT NULL,
            capacity INTEGER NOT NULL,
            location TEXT NOT NULL,
            equipment TEXT,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS medical_records(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            illness_description TEXT NOT NULL,
            treatment_type TEXT NOT NULL,
            status TEXT NOT NULL,
            check_in_date TEXT NOT NULL,
            check_out_date TEXT,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_medical_records_student ON medical_records(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS materials(
            id TEXT PRIMARY KEY,
            material_name TEXT NOT NULL,
            category TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            location TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS practice_sessions(
            id TEXT PRIMARY KEY,
            session_name TEXT NOT NULL,
            location TEXT NOT NULL,
            date TEXT NOT NULL,
            start_time TEXT,
            end_time TEXT,
            transport_details TEXT,
            status TEXT NOT NULL,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS announcements(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            category TEXT NOT NULL,
            created_by TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS messages(
            id TEXT PRIMARY KEY,
            user_name TEXT NOT NULL,
            user_email TEXT,
            message TEXT NOT NULL,
            response TEXT,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS hostel_houses(
            id TEXT PRIMARY KEY,
            house_name TEXT NOT NULL,
            house_number INTEGER NOT NULL UNIQUE,
            description TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS hostel_rooms(
            id TEXT PRIMARY KEY,
            house_id TEXT NOT NULL,
            room_number TEXT NOT NULL,
            capacity INTEGER NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(house_id) REFERENCES hostel_houses(id),
            UNIQUE(house_id, room_number)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_hostel_rooms_house ON hostel_rooms(house_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS hostel_occupants(
            id TEXT PRIMARY KEY,
            room_id TEXT NOT NULL,
            staff_id TEXT,
            occupant_name TEXT NOT NULL,
            gender TEXT NOT NULL,
            subject_teaching TEXT,
            year_level TEXT,
            check_in_date TEXT NOT NULL,
            check_out_date TEXT,
            status TEXT NOT NULL,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(room_id) REFERENCES hostel_rooms(id),
            FOREIGN KEY(staff_id) REFERENCES staff(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_hostel_occupants_room ON hostel_occupants(room_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_incidents(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            incident_type TEXT NOT NULL,
            incident_date TEXT NOT NULL,
            reason TEXT NOT NULL,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_incidents_student ON student_incidents(student_id)",
        [],
    )?;

    Ok(conn)
}

fn ensure_students_incident_type(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "incident_type")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE students ADD COLUMN incident_type TEXT NOT NULL DEFAULT 'none'",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("setting {key} is not valid json"))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}
