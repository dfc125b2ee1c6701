//! resourceql - a REST resource layer over a relational store
//!
//! Turns the `fields`, `filters`, `order`, `limit` and `offset` query
//! parameters into engine-agnostic query plans, and drives the list,
//! fetch-one, create, update, delete and fetch-relation lifecycle around
//! them.

pub mod cli;
pub mod config;
pub mod controller;
pub mod observability;
pub mod planner;
pub mod query;
pub mod response;
pub mod schema;
pub mod store;
