//! GitHub Actions REST API access.

mod client;

pub use client::{Artifact, GithubClient, GITHUB_API_URL};
