use serde::{Deserialize, Serialize};

use crate::models::CourseListing;

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SelectTermRequest<'a> {
    pub term: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct CourseListResponse {
    pub courses: Vec<CourseListing>,
}

#[derive(Debug, Serialize)]
pub struct RegistrationRequest<'a> {
    pub course_code: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Confirmed,
    Rejected,
    Pending,
}

#[derive(Debug, Deserialize)]
pub struct RegistrationResponse {
    pub status: RegistrationStatus,
    #[serde(default)]
    pub message: Option<String>,
}
