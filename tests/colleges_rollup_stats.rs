mod test_support;

use serde_json::json;
use test_support::{i64_at, request_ok, spawn_with_workspace, str_at};

#[test]
fn stats_group_students_by_faculty_and_year() {
    let (mut child, mut stdin, mut reader, workspace) = spawn_with_workspace("campusd-rollup");

    let c = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "colleges.create",
        json!({ "collegeName": "Science" }),
    );
    let college_id = str_at(&c, "/collegeId").to_string();
    let f = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "faculties.create",
        json!({ "collegeId": college_id, "facultyName": "Physics" }),
    );
    let faculty_id = str_at(&f, "/facultyId").to_string();

    let students = [
        ("S1", Some(2), "male", "none"),
        ("S2", Some(2), "female", "repeat"),
        ("S3", Some(1), "male", "none"),
    ];
    for (i, (no, year, gender, incident)) in students.iter().enumerate() {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("s{}", i),
            "students.create",
            json!({
                "studentNo": no,
                "fullName": format!("Student {}", no),
                "facultyId": faculty_id,
                "year": year,
                "gender": gender,
                "incidentType": incident
            }),
        );
    }
    // No faculty: counted nowhere in the roll-up.
    request_ok(
        &mut stdin,
        &mut reader,
        "s9",
        "students.create",
        json!({ "studentNo": "S9", "fullName": "Unplaced", "year": 1, "gender": "female" }),
    );

    let stats = request_ok(&mut stdin, &mut reader, "3", "colleges.stats", json!({}));
    let by_faculty = stats["statsByFaculty"].as_object().expect("mapping");
    assert_eq!(by_faculty.len(), 1);
    assert_eq!(
        stats["statsByFaculty"][&faculty_id],
        json!([
            {
                "year": 1,
                "stats": { "total": 1, "male": 1, "female": 0, "other": 0,
                           "repeat": 0, "dismissed": 0, "medical": 0 }
            },
            {
                "year": 2,
                "stats": { "total": 2, "male": 1, "female": 1, "other": 0,
                           "repeat": 1, "dismissed": 0, "medical": 0 }
            }
        ])
    );

    let tree = request_ok(&mut stdin, &mut reader, "4", "colleges.tree", json!({}));
    assert_eq!(str_at(&tree, "/colleges/0/collegeName"), "Science");
    assert_eq!(i64_at(&tree, "/colleges/0/facultyCount"), 1);
    assert_eq!(i64_at(&tree, "/colleges/0/totals/total"), 3);
    assert_eq!(i64_at(&tree, "/colleges/0/faculties/0/totals/repeat"), 1);

    let list = request_ok(&mut stdin, &mut reader, "5", "colleges.list", json!({}));
    assert_eq!(i64_at(&list, "/colleges/0/studentCount"), 3);
    assert_eq!(i64_at(&list, "/colleges/0/facultyCount"), 1);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn stats_follow_student_updates_without_caching() {
    let (mut child, mut stdin, mut reader, workspace) = spawn_with_workspace("campusd-rollup-fresh");

    let c = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "colleges.create",
        json!({ "collegeName": "Arts" }),
    );
    let college_id = str_at(&c, "/collegeId").to_string();
    let f = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "faculties.create",
        json!({ "collegeId": college_id, "facultyName": "Music" }),
    );
    let faculty_id = str_at(&f, "/facultyId").to_string();
    let s = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "studentNo": "A1", "fullName": "Ada", "facultyId": faculty_id, "year": 1,
                "gender": "female" }),
    );
    let student_id = str_at(&s, "/studentId").to_string();

    let before = request_ok(&mut stdin, &mut reader, "4", "colleges.stats", json!({}));
    assert_eq!(before["statsByFaculty"][&faculty_id][0]["year"], json!(1));

    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.update",
        json!({ "studentId": student_id, "patch": { "year": 2 } }),
    );
    let after = request_ok(&mut stdin, &mut reader, "6", "colleges.stats", json!({}));
    let years = after["statsByFaculty"][&faculty_id].as_array().expect("years");
    assert_eq!(years.len(), 1);
    assert_eq!(years[0]["year"], json!(2));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
