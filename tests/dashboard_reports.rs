mod test_support;

use serde_json::json;
use test_support::{i64_at, request_err, request_ok, spawn_with_workspace, str_at};

#[test]
fn dashboard_summary_reflects_every_module() {
    let (mut child, mut stdin, mut reader, workspace) = spawn_with_workspace("campusd-dashboard");

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
        json!({ "collegeId": college_id, "facultyName": "Biology" }),
    );
    let faculty_id = str_at(&f, "/facultyId").to_string();
    let s = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "studentNo": "B1", "fullName": "Rosalind", "facultyId": faculty_id, "year": 1,
                "gender": "female" }),
    );
    let student_id = str_at(&s, "/studentId").to_string();
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        json!({ "studentNo": "B2", "fullName": "Charles", "gender": "male" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "staff.create",
        json!({ "staffNo": "T1", "fullName": "Dr Who", "position": "Lecturer",
                "department": "Biology" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "rooms.create",
        json!({ "roomName": "Hall 1", "capacity": 120, "location": "Block A" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "rooms.create",
        json!({ "roomName": "Lab 2", "capacity": 30, "location": "Block B",
                "status": "occupied" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "medical.create",
        json!({ "studentId": student_id, "illnessDescription": "Sprain",
                "treatmentType": "external" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "materials.create",
        json!({ "materialName": "Beakers", "category": "Lab", "quantity": 3,
                "location": "Lab 2" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "practice.create",
        json!({ "sessionName": "Field trip", "location": "Zoo", "date": "2099-05-01" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "messages.create",
        json!({ "userName": "Parent", "message": "When is the trip?" }),
    );

    let d = request_ok(&mut stdin, &mut reader, "12", "dashboard.summary", json!({}));
    assert_eq!(i64_at(&d, "/totalStudents"), 2);
    assert_eq!(i64_at(&d, "/totalStaff"), 1);
    assert_eq!(i64_at(&d, "/totalColleges"), 1);
    assert_eq!(i64_at(&d, "/availableRooms"), 1);
    assert_eq!(i64_at(&d, "/activePatients"), 1);
    assert_eq!(i64_at(&d, "/lowStockItems"), 1);
    assert_eq!(i64_at(&d, "/upcomingPractice"), 1);
    assert_eq!(i64_at(&d, "/pendingMessages"), 1);
    assert_eq!(i64_at(&d, "/population/byGender/female"), 1);
    assert_eq!(i64_at(&d, "/population/byGender/male"), 1);
    assert_eq!(d["population"]["byFaculty"][&faculty_id], json!(1));
    assert_eq!(
        d["studentsByFaculty"],
        json!([{ "facultyId": faculty_id, "facultyName": "Biology",
                 "collegeName": "Science", "students": 1 }])
    );

    let catalog = request_ok(&mut stdin, &mut reader, "13", "reports.list", json!({}));
    let kinds: Vec<&str> = catalog["reports"]
        .as_array()
        .expect("reports")
        .iter()
        .filter_map(|r| r["kind"].as_str())
        .collect();
    assert_eq!(
        kinds,
        vec!["enrollment", "medical", "rooms", "materials", "practice", "weekly"]
    );

    let rooms = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "reports.generate",
        json!({ "kind": "rooms" }),
    );
    assert_eq!(i64_at(&rooms, "/model/totalCapacity"), 150);
    assert_eq!(i64_at(&rooms, "/model/occupied"), 1);

    let medical = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "reports.generate",
        json!({ "kind": "medical" }),
    );
    assert_eq!(i64_at(&medical, "/model/byTreatmentType/external"), 1);
    assert_eq!(i64_at(&medical, "/model/byStatus/active"), 1);

    let enrollment = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "reports.generate",
        json!({ "kind": "enrollment" }),
    );
    assert_eq!(i64_at(&enrollment, "/model/population/total"), 2);
    assert_eq!(i64_at(&enrollment, "/model/colleges/0/totals/total"), 1);

    let weekly = request_ok(
        &mut stdin,
        &mut reader,
        "17",
        "reports.generate",
        json!({ "kind": "weekly" }),
    );
    assert_eq!(i64_at(&weekly, "/model/windowDays"), 7);
    assert_eq!(i64_at(&weekly, "/model/activity/newStudents"), 2);
    assert_eq!(i64_at(&weekly, "/model/activity/messagesReceived"), 1);
    assert_eq!(i64_at(&weekly, "/model/summary/totalStaff"), 1);

    for (i, kind) in ["materials", "practice"].iter().enumerate() {
        let r = request_ok(
            &mut stdin,
            &mut reader,
            &format!("k{}", i),
            "reports.generate",
            json!({ "kind": kind }),
        );
        assert_eq!(str_at(&r, "/kind"), *kind);
    }

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "18",
            "reports.generate",
            json!({ "kind": "attendance" }),
        ),
        "bad_params"
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
