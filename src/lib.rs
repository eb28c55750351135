//! # Calibration Store
//!
//! Ingests instrument calibration text files, parses their key/value lines
//! into records with provenance, stores them in SQLite, and serves them back
//! by key or as raw file content.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────┐   ┌──────────────┐
//! │ calibration  │──▶│  Parser  │──▶│    Store     │
//! │  directory   │   │ patterns │   │ SQLite / mem │
//! └──────────────┘   └──────────┘   └──────┬───────┘
//!                                          │
//!                                  ┌───────┴───────┐
//!                                  │    Service    │
//!                                  └───────┬───────┘
//!                              ┌───────────┴──────────┐
//!                              ▼                      ▼
//!                         ┌─────────┐            ┌─────────┐
//!                         │   CLI   │            │  HTTP   │
//!                         │ (calib) │            │ (/api)  │
//!                         └─────────┘            └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! calib init                 # create database
//! calib process              # ingest ./calibration_files
//! calib query FOO BAR        # look up keys
//! calib serve                # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`parser`] | Calibration line parsing |
//! | [`store`] | Repository trait, SQLite and in-memory backends |
//! | [`service`] | Ingest, query, and file retrieval |
//! | [`server`] | HTTP API |
//! | [`error`] | Error taxonomy |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod config;
pub mod db;
pub mod error;
pub mod migrate;
pub mod models;
pub mod parser;
pub mod server;
pub mod service;
pub mod store;
