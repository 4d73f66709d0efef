pub fn bytes_to_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|x| format!("{:02X}", x))
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_bytes_as_spaced_hex() {
        assert_eq!(bytes_to_string(&[0xAA, 0xBB, 0x0C]), "AA BB 0C");
        assert_eq!(bytes_to_string(&[]), "");
    }
}
