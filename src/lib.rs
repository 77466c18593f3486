pub mod booking;
pub mod catalog;
pub mod class;
pub mod config;
pub mod db;
pub mod engine;
pub mod environment;
pub mod errors;
pub mod normalization;
pub mod routes;
