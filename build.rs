fn main() {
    // ESP-IDF sysenv is only needed for target builds; host tests skip it.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
