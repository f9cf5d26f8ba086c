pub mod markup;
pub mod my_app;
