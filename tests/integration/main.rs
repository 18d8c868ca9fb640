//! Integration tests for the crawl frontier
//!
//! These tests drive a full frontier (worker pool, SQLite queue store, dedup
//! filters) against a scripted in-process harvester, plus one run against a
//! wiremock harvester service.

mod frontier_tests;
mod harvester_tests;
mod support;
