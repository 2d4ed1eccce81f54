pub mod audio;
pub mod bot;
pub mod chastushka;
pub mod clock;
pub mod config;
pub mod db;
pub mod engagement;
pub mod error;
pub mod facts;
pub mod history;
pub mod llm;
pub mod logging;
pub mod memes;
pub mod movies;
pub mod photo_comment;
pub mod scheduler;
pub mod speech;
pub mod vision;
pub mod web;
