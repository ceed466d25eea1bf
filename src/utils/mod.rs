pub mod cursor;
pub mod db_utils;
