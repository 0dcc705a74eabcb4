//! Reader tests against committed sample files.

mod edr_fixture_test;
