mod common;
mod delete_tests;
mod stages_tests;
