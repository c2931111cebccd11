#[cfg(test)]
mod helpers;
#[cfg(test)]
mod tests_compression;
#[cfg(test)]
mod tests_invariants;
