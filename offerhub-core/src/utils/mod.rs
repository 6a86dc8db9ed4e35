pub mod clock;
pub mod csv_text;
