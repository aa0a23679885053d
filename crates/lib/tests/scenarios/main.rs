mod common;
mod deploy_tests;
mod ordering_tests;
