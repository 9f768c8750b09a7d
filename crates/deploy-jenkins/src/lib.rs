pub mod jenkins_backend;

pub use jenkins_backend::JenkinsBackend;
