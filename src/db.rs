use anyhow::Context;
use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "centerdesk.sqlite3";

/// Tables whose rows the record layer may read and write.
pub const RECORD_TABLES: &[&str] = &[
    "centers",
    "programs",
    "employees",
    "students",
    "payroll",
    "performance_records",
    "general_reporting",
    "student_attendance",
    "pending_registrations",
];

/// Tables operators may extend with custom columns.
pub const EXTENSIBLE_TABLES: &[&str] = &["employees", "students", "payroll", "performance_records"];

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.to_string_lossy()))?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS centers(
            id TEXT PRIMARY KEY,
            center_id INTEGER NOT NULL UNIQUE,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS programs(
            id TEXT PRIMARY KEY,
            program_id INTEGER NOT NULL UNIQUE,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS employees(
            id TEXT PRIMARY KEY,
            employee_id INTEGER NOT NULL UNIQUE,
            name TEXT NOT NULL,
            gender TEXT,
            date_of_birth DATE,
            blood_group TEXT,
            email TEXT,
            phone TEXT,
            emergency_contact_name TEXT,
            emergency_contact TEXT,
            designation TEXT,
            department TEXT,
            employment_type TEXT,
            status TEXT,
            work_location TEXT,
            date_of_joining DATE,
            date_of_leaving DATE,
            center_id INTEGER,
            program_id INTEGER,
            photo TEXT,
            lor TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_employees_center ON employees(center_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            student_id INTEGER NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            gender TEXT,
            dob DATE,
            fathers_name TEXT,
            mothers_name TEXT,
            primary_diagnosis TEXT,
            comorbidity TEXT,
            blood_group TEXT,
            allergies TEXT,
            udid TEXT,
            contact_number TEXT,
            alt_contact_number TEXT,
            status TEXT,
            enrollment_year INTEGER,
            address TEXT,
            parents_email TEXT,
            student_email TEXT,
            center_id INTEGER,
            program_id INTEGER,
            educator_employee_id INTEGER,
            photo TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_center_program ON students(center_id, program_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payroll(
            id TEXT PRIMARY KEY,
            payroll_id INTEGER NOT NULL UNIQUE,
            employee_id INTEGER NOT NULL,
            pay_period TEXT NOT NULL,
            salary NUMERIC NOT NULL,
            bonus NUMERIC,
            deductions NUMERIC,
            paid_on DATE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS performance_records(
            id TEXT PRIMARY KEY,
            student_id INTEGER NOT NULL,
            program_id INTEGER NOT NULL,
            educator_employee_id INTEGER NOT NULL,
            quarter TEXT NOT NULL,
            area_of_development TEXT,
            is_sent BOOLEAN NOT NULL DEFAULT 0,
            skill_area TEXT,
            comments TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_performance_student ON performance_records(student_id)",
        [],
    )?;
    // Skill score columns come in numbered pairs; the first few exist up front,
    // anything further is added as a custom column.
    for n in 1..=5 {
        ensure_column(&conn, "performance_records", &format!("{n}_score"), "NUMERIC")?;
        ensure_column(&conn, "performance_records", &format!("{n}_description"), "TEXT")?;
    }

    conn.execute(
        "CREATE TABLE IF NOT EXISTS general_reporting(
            id TEXT PRIMARY KEY,
            student_id INTEGER NOT NULL,
            program_id INTEGER NOT NULL,
            educator_employee_id INTEGER NOT NULL,
            quarter TEXT NOT NULL,
            is_sent BOOLEAN NOT NULL DEFAULT 0,
            punctuality TEXT,
            preparedness TEXT,
            assistance_required TEXT,
            parental_support TEXT,
            any_behavioral_issues TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_attendance(
            id TEXT PRIMARY KEY,
            student_id INTEGER NOT NULL,
            date DATE NOT NULL,
            attendance BOOLEAN NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON student_attendance(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS pending_registrations(
            id TEXT PRIMARY KEY,
            submitted_at TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            payload TEXT NOT NULL,
            decided_at TEXT
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_column(conn: &Connection, table: &str, column: &str, sql_type: &str) -> anyhow::Result<()> {
    if table_has_column(conn, table, column)? {
        return Ok(());
    }
    conn.execute(
        &format!("ALTER TABLE {} ADD COLUMN \"{}\" {}", table, column, sql_type),
        [],
    )?;
    Ok(())
}

pub fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
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
