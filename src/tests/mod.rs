


#[cfg(test)]
pub mod relay_tests;

#[cfg(test)]
pub mod selection_tests;
