//! Unit tests for the task domain and orchestration services.

mod service_tests;
