//! Roll-up of flat student rows into faculty/year statistics.
//!
//! Everything here is pure: callers load the rows, call in, and get a fresh
//! result back. Nothing is cached between calls.

use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub const ALL: [&'static str; 3] = ["male", "female", "other"];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            "other" => Some(Gender::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncidentType {
    None,
    Repeat,
    Dismissed,
    MedicalDischarge,
}

impl IncidentType {
    /// Values accepted on an incident row. `none` only ever lives on the
    /// student row itself.
    pub const RECORDABLE: [&'static str; 3] = ["repeat", "dismissed", "medical_discharge"];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "none" => Some(IncidentType::None),
            "repeat" => Some(IncidentType::Repeat),
            "dismissed" => Some(IncidentType::Dismissed),
            "medical_discharge" => Some(IncidentType::MedicalDischarge),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IncidentType::None => "none",
            IncidentType::Repeat => "repeat",
            IncidentType::Dismissed => "dismissed",
            IncidentType::MedicalDischarge => "medical_discharge",
        }
    }
}

/// One student row as seen by the roll-up. Text values outside the known
/// enumerations are carried as `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRecord {
    pub faculty_id: Option<String>,
    pub year: Option<i64>,
    pub gender: Option<Gender>,
    pub incident: Option<IncidentType>,
}

impl StudentRecord {
    /// Bucket identity. An empty faculty id or a zero year counts as missing.
    fn bucket_key(&self) -> Option<(&str, i64)> {
        let faculty = self.faculty_id.as_deref().filter(|f| !f.is_empty())?;
        let year = self.year.filter(|y| *y != 0)?;
        Some((faculty, year))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStats {
    pub total: u64,
    pub male: u64,
    pub female: u64,
    pub other: u64,
    pub repeat: u64,
    pub dismissed: u64,
    pub medical: u64,
}

impl StudentStats {
    fn record(&mut self, gender: Option<Gender>, incident: Option<IncidentType>) {
        self.total += 1;
        match gender {
            Some(Gender::Male) => self.male += 1,
            Some(Gender::Female) => self.female += 1,
            Some(Gender::Other) => self.other += 1,
            None => {}
        }
        match incident {
            Some(IncidentType::Repeat) => self.repeat += 1,
            Some(IncidentType::Dismissed) => self.dismissed += 1,
            Some(IncidentType::MedicalDischarge) => self.medical += 1,
            Some(IncidentType::None) | None => {}
        }
    }

    pub fn absorb(&mut self, other: &StudentStats) {
        self.total += other.total;
        self.male += other.male;
        self.female += other.female;
        self.other += other.other;
        self.repeat += other.repeat;
        self.dismissed += other.dismissed;
        self.medical += other.medical;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YearStats {
    pub year: i64,
    pub stats: StudentStats,
}

/// Faculty id -> year buckets, ascending by year.
pub type FacultyYearStats = BTreeMap<String, Vec<YearStats>>;

/// Groups records by `(faculty, year)` and counts them.
///
/// Records without a faculty or year are skipped. Within each faculty the
/// buckets come out sorted by year; faculties iterate in id order, so the
/// result does not depend on input order.
pub fn aggregate<'a, I>(records: I) -> FacultyYearStats
where
    I: IntoIterator<Item = &'a StudentRecord>,
{
    let mut buckets: BTreeMap<&'a str, BTreeMap<i64, StudentStats>> = BTreeMap::new();
    for record in records {
        let Some((faculty, year)) = record.bucket_key() else {
            continue;
        };
        buckets
            .entry(faculty)
            .or_default()
            .entry(year)
            .or_default()
            .record(record.gender, record.incident);
    }

    buckets
        .into_iter()
        .map(|(faculty, years)| {
            let years = years
                .into_iter()
                .map(|(year, stats)| YearStats { year, stats })
                .collect();
            (faculty.to_string(), years)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GenderCounts {
    pub male: u64,
    pub female: u64,
    pub other: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationSummary {
    pub total: u64,
    pub by_gender: GenderCounts,
    pub by_faculty: BTreeMap<String, u64>,
}

/// Flat dashboard counts: everybody, by gender, by faculty.
pub fn summarize_population<'a, I>(records: I) -> PopulationSummary
where
    I: IntoIterator<Item = &'a StudentRecord>,
{
    let mut out = PopulationSummary::default();
    for record in records {
        out.total += 1;
        match record.gender {
            Some(Gender::Male) => out.by_gender.male += 1,
            Some(Gender::Female) => out.by_gender.female += 1,
            Some(Gender::Other) => out.by_gender.other += 1,
            None => {}
        }
        if let Some(faculty) = record.faculty_id.as_deref().filter(|f| !f.is_empty()) {
            *out.by_faculty.entry(faculty.to_string()).or_insert(0) += 1;
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct CollegeNode {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct FacultyNode {
    pub id: String,
    pub college_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacultyRollup {
    pub faculty_id: String,
    pub faculty_name: String,
    pub totals: StudentStats,
    pub years: Vec<YearStats>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollegeRollup {
    pub college_id: String,
    pub college_name: String,
    pub faculty_count: usize,
    pub totals: StudentStats,
    pub faculties: Vec<FacultyRollup>,
}

/// Hangs the per-faculty buckets under their colleges.
///
/// Colleges keep the caller's order; faculties are listed by name. A faculty
/// whose college is not in `colleges` is dropped.
pub fn nest_by_college(
    colleges: &[CollegeNode],
    faculties: &[FacultyNode],
    by_faculty: &FacultyYearStats,
) -> Vec<CollegeRollup> {
    let mut sorted: Vec<&FacultyNode> = faculties.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

    colleges
        .iter()
        .map(|college| {
            let mut totals = StudentStats::default();
            let faculties: Vec<FacultyRollup> = sorted
                .iter()
                .filter(|f| f.college_id == college.id)
                .map(|f| {
                    let years = by_faculty.get(&f.id).cloned().unwrap_or_default();
                    let mut faculty_totals = StudentStats::default();
                    for y in &years {
                        faculty_totals.absorb(&y.stats);
                    }
                    totals.absorb(&faculty_totals);
                    FacultyRollup {
                        faculty_id: f.id.clone(),
                        faculty_name: f.name.clone(),
                        totals: faculty_totals,
                        years,
                    }
                })
                .collect();
            CollegeRollup {
                college_id: college.id.clone(),
                college_name: college.name.clone(),
                faculty_count: faculties.len(),
                totals,
                faculties,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rec(
        faculty: Option<&str>,
        year: Option<i64>,
        gender: &str,
        incident: &str,
    ) -> StudentRecord {
        StudentRecord {
            faculty_id: faculty.map(str::to_string),
            year,
            gender: Gender::parse(gender),
            incident: IncidentType::parse(incident),
        }
    }

    fn stats(total: u64, male: u64, female: u64, other: u64, repeat: u64) -> StudentStats {
        StudentStats {
            total,
            male,
            female,
            other,
            repeat,
            dismissed: 0,
            medical: 0,
        }
    }

    #[test]
    fn groups_by_faculty_and_sorts_years() {
        let records = vec![
            rec(Some("F1"), Some(2), "male", "none"),
            rec(Some("F1"), Some(2), "female", "repeat"),
            rec(Some("F1"), Some(1), "male", "none"),
            rec(Some("F2"), Some(1), "other", "none"),
        ];
        let out = aggregate(&records);

        assert_eq!(out.len(), 2);
        assert_eq!(
            out["F1"],
            vec![
                YearStats {
                    year: 1,
                    stats: stats(1, 1, 0, 0, 0)
                },
                YearStats {
                    year: 2,
                    stats: stats(2, 1, 1, 0, 1)
                },
            ]
        );
        assert_eq!(
            out["F2"],
            vec![YearStats {
                year: 1,
                stats: stats(1, 0, 0, 1, 0)
            }]
        );
    }

    #[test]
    fn missing_grouping_keys_are_skipped() {
        let records = vec![
            rec(None, Some(1), "male", "none"),
            rec(Some("F1"), None, "male", "none"),
            rec(Some(""), Some(1), "male", "none"),
            rec(Some("F1"), Some(0), "female", "none"),
            rec(Some("F1"), Some(3), "female", "dismissed"),
        ];
        let out = aggregate(&records);
        assert_eq!(out.len(), 1);
        assert_eq!(out["F1"].len(), 1);
        assert_eq!(out["F1"][0].year, 3);
        assert_eq!(out["F1"][0].stats.total, 1);
        assert_eq!(out["F1"][0].stats.dismissed, 1);
    }

    #[test]
    fn unknown_enum_values_count_toward_total_only() {
        let records = vec![
            rec(Some("F1"), Some(1), "robot", "expelled"),
            rec(Some("F1"), Some(1), "female", "medical_discharge"),
        ];
        let out = aggregate(&records);
        let s = out["F1"][0].stats;
        assert_eq!(s.total, 2);
        assert_eq!(s.male + s.female + s.other, 1);
        assert_eq!(s.medical, 1);
        assert_eq!(s.repeat + s.dismissed, 0);
    }

    #[test]
    fn empty_input_gives_empty_mapping() {
        let records: Vec<StudentRecord> = Vec::new();
        assert!(aggregate(&records).is_empty());
        assert_eq!(summarize_population(&records), PopulationSummary::default());
    }

    #[test]
    fn year_buckets_sort_numerically() {
        let records = vec![
            rec(Some("F1"), Some(10), "male", "none"),
            rec(Some("F1"), Some(2), "male", "none"),
            rec(Some("F1"), Some(-1), "male", "none"),
        ];
        let years: Vec<i64> = aggregate(&records)["F1"].iter().map(|y| y.year).collect();
        assert_eq!(years, vec![-1, 2, 10]);
    }

    #[test]
    fn population_summary_counts_everyone() {
        let records = vec![
            rec(Some("F1"), Some(1), "male", "none"),
            rec(Some("F1"), None, "female", "none"),
            rec(None, None, "other", "none"),
            rec(Some("F2"), Some(4), "unknown", "none"),
        ];
        let out = summarize_population(&records);
        assert_eq!(out.total, 4);
        assert_eq!(
            out.by_gender,
            GenderCounts {
                male: 1,
                female: 1,
                other: 1
            }
        );
        assert_eq!(out.by_faculty.get("F1"), Some(&2));
        assert_eq!(out.by_faculty.get("F2"), Some(&1));
        assert_eq!(out.by_faculty.len(), 2);
    }

    #[test]
    fn nest_by_college_builds_totals_per_level() {
        let records = vec![
            rec(Some("eng"), Some(1), "male", "none"),
            rec(Some("eng"), Some(2), "female", "repeat"),
            rec(Some("arts"), Some(1), "female", "none"),
            rec(Some("orphan"), Some(1), "male", "none"),
        ];
        let by_faculty = aggregate(&records);
        let colleges = vec![
            CollegeNode {
                id: "c2".into(),
                name: "Science".into(),
            },
            CollegeNode {
                id: "c1".into(),
                name: "Humanities".into(),
            },
        ];
        let faculties = vec![
            FacultyNode {
                id: "eng".into(),
                college_id: "c2".into(),
                name: "Engineering".into(),
            },
            FacultyNode {
                id: "bio".into(),
                college_id: "c2".into(),
                name: "Biology".into(),
            },
            FacultyNode {
                id: "arts".into(),
                college_id: "c1".into(),
                name: "Arts".into(),
            },
            FacultyNode {
                id: "orphan".into(),
                college_id: "gone".into(),
                name: "Orphan".into(),
            },
        ];

        let tree = nest_by_college(&colleges, &faculties, &by_faculty);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].college_id, "c2");
        assert_eq!(tree[0].faculty_count, 2);
        let names: Vec<&str> = tree[0]
            .faculties
            .iter()
            .map(|f| f.faculty_name.as_str())
            .collect();
        assert_eq!(names, vec!["Biology", "Engineering"]);
        assert_eq!(tree[0].faculties[0].totals, StudentStats::default());
        assert!(tree[0].faculties[0].years.is_empty());
        assert_eq!(tree[0].faculties[1].totals, stats(2, 1, 1, 0, 1));
        assert_eq!(tree[0].totals, stats(2, 1, 1, 0, 1));
        assert_eq!(tree[1].totals.total, 1);
    }

    fn record_strategy() -> impl Strategy<Value = StudentRecord> {
        (
            proptest::option::of(
                prop_oneof![Just("F1"), Just("F2"), Just("F3"), Just("")].prop_map(String::from),
            ),
            proptest::option::of(0i64..6),
            proptest::option::of(prop_oneof![
                Just(Gender::Male),
                Just(Gender::Female),
                Just(Gender::Other)
            ]),
            proptest::option::of(prop_oneof![
                Just(IncidentType::None),
                Just(IncidentType::Repeat),
                Just(IncidentType::Dismissed),
                Just(IncidentType::MedicalDischarge)
            ]),
        )
            .prop_map(|(faculty_id, year, gender, incident)| StudentRecord {
                faculty_id,
                year,
                gender,
                incident,
            })
    }

    fn bucket_total(out: &FacultyYearStats, faculty: &str, year: i64) -> u64 {
        out.get(faculty)
            .and_then(|ys| ys.iter().find(|y| y.year == year))
            .map(|y| y.stats.total)
            .unwrap_or(0)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_order_independent(
            (records, shuffled) in proptest::collection::vec(record_strategy(), 0..40)
                .prop_flat_map(|rs| (Just(rs.clone()), Just(rs).prop_shuffle()))
        ) {
            prop_assert_eq!(aggregate(&records), aggregate(&shuffled));
        }

        #[test]
        fn prop_bucket_totals_match_input(
            records in proptest::collection::vec(record_strategy(), 0..60)
        ) {
            let out = aggregate(&records);
            for (faculty, years) in &out {
                let mut last = i64::MIN;
                for y in years {
                    prop_assert!(y.year > last);
                    last = y.year;
                    let expected = records
                        .iter()
                        .filter(|r| r.bucket_key() == Some((faculty.as_str(), y.year)))
                        .count() as u64;
                    prop_assert_eq!(y.stats.total, expected);
                    // Every generated record has a known gender or none at all.
                    let genderless = records
                        .iter()
                        .filter(|r| r.bucket_key() == Some((faculty.as_str(), y.year)) && r.gender.is_none())
                        .count() as u64;
                    prop_assert_eq!(y.stats.male + y.stats.female + y.stats.other + genderless, y.stats.total);
                    prop_assert!(y.stats.repeat + y.stats.dismissed + y.stats.medical <= y.stats.total);
                }
            }
            let included = records.iter().filter(|r| r.bucket_key().is_some()).count() as u64;
            let summed: u64 = out.values().flatten().map(|y| y.stats.total).sum();
            prop_assert_eq!(summed, included);
        }

        #[test]
        fn prop_one_more_record_bumps_one_bucket(
            records in proptest::collection::vec(record_strategy(), 0..30),
            extra in record_strategy()
        ) {
            prop_assume!(extra.bucket_key().is_some());
            let before = aggregate(&records);
            let mut grown = records.clone();
            grown.push(extra.clone());
            let after = aggregate(&grown);

            let (faculty, year) = extra.bucket_key().unwrap();
            prop_assert_eq!(
                bucket_total(&after, faculty, year),
                bucket_total(&before, faculty, year) + 1
            );
            let before_sum: u64 = before.values().flatten().map(|y| y.stats.total).sum();
            let after_sum: u64 = after.values().flatten().map(|y| y.stats.total).sum();
            prop_assert_eq!(after_sum, before_sum + 1);
        }
    }
}
