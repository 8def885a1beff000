#![doc = "pdq-push: publish PDQ summary documents to the Drupal CMS."]

//! This crate pushes PDQ cancer and drug information summaries from a
//! local document store into a Drupal CMS: each selected document is
//! transformed into the CMS's JSON representation, stored as a draft
//! through the PDQ ingestion API, and drafts are swept to the published
//! state in batches.
//!
//! # Usage
//! The `pdq-push` binary drives the pipeline; the library modules are
//! usable (and tested) on their own via the collaborator traits in
//! [`contract`].

pub mod cli;
pub mod config;
pub mod contract;
pub mod document;
pub mod gateway;
pub mod publish;
pub mod select;
pub mod store;
pub mod transform;
