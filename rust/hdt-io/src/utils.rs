pub mod read_adapter;

#[macro_export]
macro_rules! verify {
    ($expr:expr) => {{
        let result = $expr;
        $crate::utils::verify(result, stringify!($expr))?;
    }};
}

pub fn verify(predicate: bool, condition: &str) -> std::io::Result<()> {
    if predicate {
        Ok(())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            condition,
        ))
    }
}
