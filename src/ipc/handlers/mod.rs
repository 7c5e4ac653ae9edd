pub mod announcements;
pub mod colleges;
pub mod core;
pub mod dashboard;
pub mod hostel;
pub mod incidents;
pub mod materials;
pub mod medical;
pub mod messages;
pub mod practice;
pub mod reports;
pub mod rooms;
pub mod setup;
pub mod staff;
pub mod students;
