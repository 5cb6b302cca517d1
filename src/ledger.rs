use crate::addr::{dedup_preserving_order, Address};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::fmt;

/// Typed business failures. Every variant leaves the database unchanged;
/// `Storage` is the separate infrastructure category (the whole transaction
/// rolls back and the caller retries from scratch).
#[derive(Debug)]
pub enum LedgerError {
    OnlyAdmin,
    OnlyTeacher,
    OnlyCourseOwner,
    CourseNotFound,
    CourseNotActive,
    FormNotFound,
    FormNotOpen,
    AlreadyResponded,
    NotEnrolledInForm,
    EmptyRoster,
    Storage(rusqlite::Error),
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::OnlyAdmin => "only_admin",
            LedgerError::OnlyTeacher => "only_teacher",
            LedgerError::OnlyCourseOwner => "only_course_owner",
            LedgerError::CourseNotFound => "course_not_found",
            LedgerError::CourseNotActive => "course_not_active",
            LedgerError::FormNotFound => "form_not_found",
            LedgerError::FormNotOpen => "form_not_open",
            LedgerError::AlreadyResponded => "already_responded",
            LedgerError::NotEnrolledInForm => "not_enrolled",
            LedgerError::EmptyRoster => "empty_roster",
            LedgerError::Storage(_) => "db_failed",
        }
    }
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::OnlyAdmin => write!(f, "caller is not the admin"),
            LedgerError::OnlyTeacher => write!(f, "caller is not an active registered teacher"),
            LedgerError::OnlyCourseOwner => write!(f, "caller does not own this course"),
            LedgerError::CourseNotFound => write!(f, "course not found"),
            LedgerError::CourseNotActive => write!(f, "course is not active"),
            LedgerError::FormNotFound => write!(f, "attendance form not found"),
            LedgerError::FormNotOpen => write!(f, "attendance form is not open"),
            LedgerError::AlreadyResponded => write!(f, "student has already responded to this form"),
            LedgerError::NotEnrolledInForm => write!(f, "student is not enrolled in this form"),
            LedgerError::EmptyRoster => write!(f, "student roster must not be empty"),
            LedgerError::Storage(e) => write!(f, "storage failure: {}", e),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        LedgerError::Storage(e)
    }
}

type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormStatus {
    Open,
    Closed,
}

impl FormStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FormStatus::Open => "open",
            FormStatus::Closed => "closed",
        }
    }

    fn from_db(s: &str) -> FormStatus {
        // Only the two spellings below are ever written.
        if s == "closed" {
            FormStatus::Closed
        } else {
            FormStatus::Open
        }
    }
}

#[derive(Debug, Clone)]
pub struct TeacherRecord {
    pub address: Address,
    pub registered_at: i64,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct Course {
    pub course_id: i64,
    pub name: String,
    pub teacher: Address,
    pub active: bool,
    pub created_at: i64,
    pub form_ids: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct FormDetails {
    pub form_id: i64,
    pub course_id: i64,
    pub teacher: Address,
    pub description: String,
    pub status: FormStatus,
    pub present_count: i64,
    pub enrolled_count: i64,
    pub opened_at: i64,
    pub closed_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StudentStatus {
    pub has_responded: bool,
    pub present: bool,
}

#[derive(Debug, Clone)]
pub struct EventRecord {
    pub seq: i64,
    pub kind: String,
    pub payload: serde_json::Value,
    pub at: i64,
}

// ---------------------------------------------------------------------------
// Admin identity

pub fn admin_address(conn: &Connection) -> Result<Option<Address>> {
    let v: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'admin_address'",
            [],
            |r| r.get(0),
        )
        .optional()?;
    Ok(v.map(Address::from_canonical))
}

/// Fixes the admin identity on a fresh ledger. The ON CONFLICT clause makes
/// reassignment impossible at the storage level; callers check the stored
/// value first and surface their own error on mismatch.
pub fn set_admin_if_absent(conn: &Connection, address: &Address) -> Result<()> {
    conn.execute(
        "INSERT INTO meta(key, value) VALUES('admin_address', ?)
         ON CONFLICT(key) DO NOTHING",
        [address.as_str()],
    )?;
    Ok(())
}

fn require_admin(conn: &Connection, caller: &Address) -> Result<()> {
    match admin_address(conn)? {
        Some(admin) if admin == *caller => Ok(()),
        _ => Err(LedgerError::OnlyAdmin),
    }
}

fn require_active_teacher(conn: &Connection, caller: &Address) -> Result<()> {
    let active: Option<i64> = conn
        .query_row(
            "SELECT active FROM teachers WHERE address = ?",
            [caller.as_str()],
            |r| r.get(0),
        )
        .optional()?;
    if active == Some(1) {
        Ok(())
    } else {
        Err(LedgerError::OnlyTeacher)
    }
}

// ---------------------------------------------------------------------------
// Shared plumbing

/// Bumps a counter and returns the new value. Runs inside the caller's
/// transaction so a rollback also rolls the counter back; committed values
/// are strictly increasing and never reused.
fn next_id(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute("UPDATE counters SET value = value + 1 WHERE name = ?", [name])?;
    let v: i64 = conn.query_row(
        "SELECT value FROM counters WHERE name = ?",
        [name],
        |r| r.get(0),
    )?;
    Ok(v)
}

/// Appends to the notification log. Always called after the state mutation
/// it describes, inside the same transaction, so observers never see an
/// event for a change that did not commit.
fn emit(conn: &Connection, kind: &str, payload: &serde_json::Value, now: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO events(kind, payload, at) VALUES(?, ?, ?)",
        (kind, payload.to_string(), now),
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Teacher registry

pub fn register_teacher(
    conn: &Connection,
    caller: &Address,
    address: &Address,
    now: i64,
) -> Result<TeacherRecord> {
    let tx = conn.unchecked_transaction()?;
    require_admin(&tx, caller)?;

    let existing: Option<i64> = tx
        .query_row(
            "SELECT active FROM teachers WHERE address = ?",
            [address.as_str()],
            |r| r.get(0),
        )
        .optional()?;

    match existing {
        None => {
            tx.execute(
                "INSERT INTO teachers(address, registered_at, active) VALUES(?, ?, 1)",
                (address.as_str(), now),
            )?;
            emit(&tx, "TeacherRegistered", &json!({ "teacher": address.as_str() }), now)?;
        }
        Some(0) => {
            tx.execute(
                "UPDATE teachers SET active = 1, registered_at = ? WHERE address = ?",
                (now, address.as_str()),
            )?;
            emit(&tx, "TeacherRegistered", &json!({ "teacher": address.as_str() }), now)?;
        }
        Some(_) => {
            // Already active: idempotent success, timestamp refresh only.
            tx.execute(
                "UPDATE teachers SET registered_at = ? WHERE address = ?",
                (now, address.as_str()),
            )?;
        }
    }

    tx.commit()?;
    Ok(TeacherRecord {
        address: address.clone(),
        registered_at: now,
        active: true,
    })
}

/// Soft deactivation. Unregistering an unknown or already-inactive address
/// is a no-op success, matching the registry's soft-delete philosophy.
pub fn unregister_teacher(conn: &Connection, caller: &Address, address: &Address) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    require_admin(&tx, caller)?;
    tx.execute(
        "UPDATE teachers SET active = 0 WHERE address = ?",
        [address.as_str()],
    )?;
    tx.commit()?;
    Ok(())
}

pub fn is_teacher_registered(conn: &Connection, address: &Address) -> Result<bool> {
    let active: Option<i64> = conn
        .query_row(
            "SELECT active FROM teachers WHERE address = ?",
            [address.as_str()],
            |r| r.get(0),
        )
        .optional()?;
    Ok(active == Some(1))
}

pub fn list_teachers(conn: &Connection) -> Result<Vec<TeacherRecord>> {
    let mut stmt = conn.prepare(
        "SELECT address, registered_at, active FROM teachers ORDER BY registered_at, address",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(TeacherRecord {
                address: Address::from_canonical(r.get(0)?),
                registered_at: r.get(1)?,
                active: r.get::<_, i64>(2)? != 0,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Course registry

pub fn add_course(conn: &Connection, caller: &Address, name: &str, now: i64) -> Result<Course> {
    let tx = conn.unchecked_transaction()?;
    require_active_teacher(&tx, caller)?;

    let course_id = next_id(&tx, "course_id")?;
    tx.execute(
        "INSERT INTO courses(id, name, teacher, active, created_at) VALUES(?, ?, ?, 1, ?)",
        (course_id, name, caller.as_str(), now),
    )?;
    emit(
        &tx,
        "CourseAdded",
        &json!({
            "courseId": course_id,
            "name": name,
            "teacher": caller.as_str(),
        }),
        now,
    )?;
    tx.commit()?;

    Ok(Course {
        course_id,
        name: name.to_string(),
        teacher: caller.clone(),
        active: true,
        created_at: now,
        form_ids: Vec::new(),
    })
}

pub fn get_course(conn: &Connection, course_id: i64) -> Result<Course> {
    let row = conn
        .query_row(
            "SELECT name, teacher, active, created_at FROM courses WHERE id = ?",
            [course_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, i64>(2)?,
                    r.get::<_, i64>(3)?,
                ))
            },
        )
        .optional()?;
    let Some((name, teacher, active, created_at)) = row else {
        return Err(LedgerError::CourseNotFound);
    };

    // Form ids are globally monotonic, so id order is creation order.
    let mut stmt = conn.prepare("SELECT id FROM forms WHERE course_id = ? ORDER BY id")?;
    let form_ids = stmt
        .query_map([course_id], |r| r.get::<_, i64>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Course {
        course_id,
        name,
        teacher: Address::from_canonical(teacher),
        active: active != 0,
        created_at,
        form_ids,
    })
}

pub fn active_course_ids_for_teacher(conn: &Connection, teacher: &Address) -> Result<Vec<i64>> {
    let mut stmt =
        conn.prepare("SELECT id FROM courses WHERE teacher = ? AND active = 1 ORDER BY id")?;
    let ids = stmt
        .query_map([teacher.as_str()], |r| r.get::<_, i64>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Soft deactivation; existing forms and their history are untouched.
/// Deactivating an already-inactive course is a no-op success.
pub fn deactivate_course(conn: &Connection, caller: &Address, course_id: i64) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    let owner: Option<String> = tx
        .query_row(
            "SELECT teacher FROM courses WHERE id = ?",
            [course_id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(owner) = owner else {
        return Err(LedgerError::CourseNotFound);
    };
    if owner != caller.as_str() {
        return Err(LedgerError::OnlyCourseOwner);
    }
    tx.execute("UPDATE courses SET active = 0 WHERE id = ?", [course_id])?;
    tx.commit()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Attendance form engine

pub fn create_form(
    conn: &Connection,
    caller: &Address,
    course_id: i64,
    students: Vec<Address>,
    description: &str,
    now: i64,
) -> Result<FormDetails> {
    let tx = conn.unchecked_transaction()?;

    let row: Option<(String, i64)> = tx
        .query_row(
            "SELECT teacher, active FROM courses WHERE id = ?",
            [course_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((owner, active)) = row else {
        return Err(LedgerError::CourseNotFound);
    };
    if owner != caller.as_str() {
        return Err(LedgerError::OnlyCourseOwner);
    }
    if active == 0 {
        return Err(LedgerError::CourseNotActive);
    }

    let roster = dedup_preserving_order(students);
    if roster.is_empty() {
        return Err(LedgerError::EmptyRoster);
    }

    let form_id = next_id(&tx, "form_id")?;
    tx.execute(
        "INSERT INTO forms(id, course_id, teacher, description, status, present_count, opened_at, closed_at)
         VALUES(?, ?, ?, ?, 'open', 0, ?, NULL)",
        (form_id, course_id, caller.as_str(), description, now),
    )?;
    for (i, student) in roster.iter().enumerate() {
        tx.execute(
            "INSERT INTO form_students(form_id, address, sort_order) VALUES(?, ?, ?)",
            (form_id, student.as_str(), i as i64),
        )?;
    }
    emit(
        &tx,
        "AttendanceFormCreated",
        &json!({
            "formId": form_id,
            "courseId": course_id,
            "teacher": caller.as_str(),
            "studentCount": roster.len(),
            "description": description,
        }),
        now,
    )?;
    tx.commit()?;

    Ok(FormDetails {
        form_id,
        course_id,
        teacher: caller.clone(),
        description: description.to_string(),
        status: FormStatus::Open,
        present_count: 0,
        enrolled_count: roster.len() as i64,
        opened_at: now,
        closed_at: None,
    })
}

pub fn submit_attendance(
    conn: &Connection,
    caller: &Address,
    form_id: i64,
    attended: bool,
    now: i64,
) -> Result<FormDetails> {
    let tx = conn.unchecked_transaction()?;

    let status: Option<String> = tx
        .query_row("SELECT status FROM forms WHERE id = ?", [form_id], |r| {
            r.get(0)
        })
        .optional()?;
    let Some(status) = status else {
        return Err(LedgerError::FormNotFound);
    };

    let enrolled: Option<i64> = tx
        .query_row(
            "SELECT 1 FROM form_students WHERE form_id = ? AND address = ?",
            (form_id, caller.as_str()),
            |r| r.get(0),
        )
        .optional()?;
    if enrolled.is_none() {
        return Err(LedgerError::NotEnrolledInForm);
    }
    if FormStatus::from_db(&status) != FormStatus::Open {
        return Err(LedgerError::FormNotOpen);
    }
    let responded: Option<i64> = tx
        .query_row(
            "SELECT 1 FROM responses WHERE form_id = ? AND address = ?",
            (form_id, caller.as_str()),
            |r| r.get(0),
        )
        .optional()?;
    if responded.is_some() {
        return Err(LedgerError::AlreadyResponded);
    }

    // Response insert and counter bump commit together; readers can never
    // observe one without the other.
    tx.execute(
        "INSERT INTO responses(form_id, address, attended, submitted_at) VALUES(?, ?, ?, ?)",
        (form_id, caller.as_str(), attended as i64, now),
    )?;
    if attended {
        tx.execute(
            "UPDATE forms SET present_count = present_count + 1 WHERE id = ?",
            [form_id],
        )?;
    }
    emit(
        &tx,
        "AttendanceSubmitted",
        &json!({
            "formId": form_id,
            "student": caller.as_str(),
            "attended": attended,
        }),
        now,
    )?;

    let details = form_details(&tx, form_id)?;
    tx.commit()?;
    Ok(details)
}

pub fn close_form(
    conn: &Connection,
    caller: &Address,
    form_id: i64,
    now: i64,
) -> Result<FormDetails> {
    let tx = conn.unchecked_transaction()?;

    let row: Option<(String, String)> = tx
        .query_row(
            "SELECT teacher, status FROM forms WHERE id = ?",
            [form_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((owner, status)) = row else {
        return Err(LedgerError::FormNotFound);
    };
    if owner != caller.as_str() {
        return Err(LedgerError::OnlyCourseOwner);
    }
    if FormStatus::from_db(&status) != FormStatus::Open {
        return Err(LedgerError::FormNotOpen);
    }

    tx.execute(
        "UPDATE forms SET status = 'closed', closed_at = ? WHERE id = ?",
        (now, form_id),
    )?;
    let details = form_details(&tx, form_id)?;
    emit(
        &tx,
        "AttendanceFormClosed",
        &json!({
            "formId": form_id,
            "presentCount": details.present_count,
            "enrolledCount": details.enrolled_count,
        }),
        now,
    )?;
    tx.commit()?;
    Ok(details)
}

// ---------------------------------------------------------------------------
// Query layer

pub fn form_details(conn: &Connection, form_id: i64) -> Result<FormDetails> {
    let row = conn
        .query_row(
            "SELECT course_id, teacher, description, status, present_count, opened_at, closed_at,
                    (SELECT COUNT(*) FROM form_students fs WHERE fs.form_id = forms.id)
             FROM forms WHERE id = ?",
            [form_id],
            |r| {
                Ok(FormDetails {
                    form_id,
                    course_id: r.get(0)?,
                    teacher: Address::from_canonical(r.get(1)?),
                    description: r.get(2)?,
                    status: FormStatus::from_db(&r.get::<_, String>(3)?),
                    present_count: r.get(4)?,
                    opened_at: r.get(5)?,
                    closed_at: r.get(6)?,
                    enrolled_count: r.get(7)?,
                })
            },
        )
        .optional()?;
    row.ok_or(LedgerError::FormNotFound)
}

pub fn enrolled_students(conn: &Connection, form_id: i64) -> Result<Vec<Address>> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM forms WHERE id = ?", [form_id], |r| r.get(0))
        .optional()?;
    if exists.is_none() {
        return Err(LedgerError::FormNotFound);
    }
    let mut stmt =
        conn.prepare("SELECT address FROM form_students WHERE form_id = ? ORDER BY sort_order")?;
    let rows = stmt
        .query_map([form_id], |r| r.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().map(Address::from_canonical).collect())
}

pub fn student_status(
    conn: &Connection,
    form_id: i64,
    student: &Address,
) -> Result<StudentStatus> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM forms WHERE id = ?", [form_id], |r| r.get(0))
        .optional()?;
    if exists.is_none() {
        return Err(LedgerError::FormNotFound);
    }
    let attended: Option<i64> = conn
        .query_row(
            "SELECT attended FROM responses WHERE form_id = ? AND address = ?",
            (form_id, student.as_str()),
            |r| r.get(0),
        )
        .optional()?;
    Ok(match attended {
        None => StudentStatus {
            has_responded: false,
            present: false,
        },
        Some(a) => StudentStatus {
            has_responded: true,
            present: a != 0,
        },
    })
}

pub fn form_ids_for_course(conn: &Connection, course_id: i64) -> Result<Vec<i64>> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM courses WHERE id = ?", [course_id], |r| {
            r.get(0)
        })
        .optional()?;
    if exists.is_none() {
        return Err(LedgerError::CourseNotFound);
    }
    let mut stmt = conn.prepare("SELECT id FROM forms WHERE course_id = ? ORDER BY id")?;
    let ids = stmt
        .query_map([course_id], |r| r.get::<_, i64>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

pub fn forms_for_student(conn: &Connection, student: &Address) -> Result<Vec<i64>> {
    let mut stmt =
        conn.prepare("SELECT form_id FROM form_students WHERE address = ? ORDER BY form_id")?;
    let ids = stmt
        .query_map([student.as_str()], |r| r.get::<_, i64>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Forms the student can still act on: open, enrolled, and not yet answered.
pub fn open_forms_for_student_in_course(
    conn: &Connection,
    student: &Address,
    course_id: i64,
) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT f.id
         FROM forms f
         JOIN form_students fs ON fs.form_id = f.id
         WHERE f.course_id = ? AND f.status = 'open' AND fs.address = ?
           AND NOT EXISTS (
             SELECT 1 FROM responses r WHERE r.form_id = f.id AND r.address = fs.address
           )
         ORDER BY f.id",
    )?;
    let ids = stmt
        .query_map((course_id, student.as_str()), |r| r.get::<_, i64>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

pub fn forms_for_teacher(conn: &Connection, teacher: &Address) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM forms WHERE teacher = ? ORDER BY id")?;
    let ids = stmt
        .query_map([teacher.as_str()], |r| r.get::<_, i64>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Forms the student is done with: already answered, or closed under them.
pub fn completed_forms_for_student(conn: &Connection, student: &Address) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT fs.form_id
         FROM form_students fs
         JOIN forms f ON f.id = fs.form_id
         WHERE fs.address = ?
           AND (f.status = 'closed' OR EXISTS (
             SELECT 1 FROM responses r WHERE r.form_id = fs.form_id AND r.address = fs.address
           ))
         ORDER BY fs.form_id",
    )?;
    let ids = stmt
        .query_map([student.as_str()], |r| r.get::<_, i64>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

// ---------------------------------------------------------------------------
// Notification log

pub fn events_after(conn: &Connection, after_seq: i64, limit: i64) -> Result<Vec<EventRecord>> {
    let mut stmt = conn.prepare(
        "SELECT seq, kind, payload, at FROM events WHERE seq > ? ORDER BY seq LIMIT ?",
    )?;
    let rows = stmt
        .query_map((after_seq, limit), |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, i64>(3)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let mut out = Vec::with_capacity(rows.len());
    for (seq, kind, payload, at) in rows {
        let payload = serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null);
        out.push(EventRecord {
            seq,
            kind,
            payload,
            at,
        });
    }
    Ok(out)
}
