mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, spawn_with_workspace, str_at};

#[test]
fn student_lifecycle_with_search_and_filters() {
    let (mut child, mut stdin, mut reader, workspace) = spawn_with_workspace("campusd-students");

    let c = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "colleges.create",
        json!({ "collegeName": "Health" }),
    );
    let college_id = str_at(&c, "/collegeId").to_string();
    let f = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "faculties.create",
        json!({ "collegeId": college_id, "facultyName": "Nursing" }),
    );
    let faculty_id = str_at(&f, "/facultyId").to_string();

    let s = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({
            "studentNo": "N-001",
            "fullName": "Florence Nightingale",
            "facultyId": faculty_id,
            "program": "Diploma",
            "year": 1,
            "gender": "female",
            "contactEmail": "fn@example.org"
        }),
    );
    let student_id = str_at(&s, "/studentId").to_string();
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        json!({ "studentNo": "N-002", "fullName": "Mary Seacole", "year": 2, "gender": "female" }),
    );

    // Faculty implies college.
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.get",
        json!({ "studentId": student_id }),
    );
    assert_eq!(str_at(&got, "/student/collegeId"), college_id);
    assert_eq!(str_at(&got, "/student/facultyName"), "Nursing");
    assert_eq!(str_at(&got, "/student/incidentType"), "none");

    let hits = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.list",
        json!({ "search": "nightin" }),
    );
    assert_eq!(hits["students"].as_array().map(|a| a.len()), Some(1));
    let by_year = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.list",
        json!({ "year": 2 }),
    );
    assert_eq!(str_at(&by_year, "/students/0/studentNo"), "N-002");

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "8",
            "students.create",
            json!({ "studentNo": "N-001", "fullName": "Dup", "gender": "male" }),
        ),
        "conflict"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "9",
            "students.create",
            json!({ "studentNo": "N-003", "fullName": "No gender" }),
        ),
        "bad_params"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "10",
            "students.update",
            json!({ "studentId": student_id, "patch": { "yaer": 3 } }),
        ),
        "bad_params"
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "students.delete",
        json!({ "studentId": student_id }),
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "12",
            "students.get",
            json!({ "studentId": student_id }),
        ),
        "not_found"
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn faculty_from_another_college_is_rejected() {
    let (mut child, mut stdin, mut reader, workspace) = spawn_with_workspace("campusd-placement");

    let a = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "colleges.create",
        json!({ "collegeName": "East" }),
    );
    let b = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "colleges.create",
        json!({ "collegeName": "West" }),
    );
    let east = str_at(&a, "/collegeId").to_string();
    let west = str_at(&b, "/collegeId").to_string();
    let f = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "faculties.create",
        json!({ "collegeId": east, "facultyName": "Maths" }),
    );
    let maths = str_at(&f, "/facultyId").to_string();

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "4",
            "students.create",
            json!({ "studentNo": "X1", "fullName": "Emmy", "collegeId": west,
                    "facultyId": maths, "gender": "female" }),
        ),
        "bad_params"
    );

    // Moving college without a faculty drops the old faculty.
    let s = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({ "studentNo": "X2", "fullName": "Emmy", "facultyId": maths, "gender": "female" }),
    );
    let student_id = str_at(&s, "/studentId").to_string();
    request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.update",
        json!({ "studentId": student_id, "patch": { "collegeId": west } }),
    );
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.get",
        json!({ "studentId": student_id }),
    );
    assert_eq!(str_at(&got, "/student/collegeId"), west);
    assert!(got["student"]["facultyId"].is_null());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
