// Byte packing helpers for the RTDE wire format (big endian).

pub fn get_u8(data: &[u8], offset: &mut usize) -> u8 {
    let v = data[*offset];
    *offset += 1;
    v
}

pub fn get_u16(data: &[u8], offset: &mut usize) -> u16 {
    let v = u16::from_be_bytes([data[*offset], data[*offset + 1]]);
    *offset += 2;
    v
}

pub fn get_u32(data: &[u8], offset: &mut usize) -> u32 {
    let v = u32::from_be_bytes(data[*offset..*offset + 4].try_into().unwrap());
    *offset += 4;
    v
}

pub fn get_i32(data: &[u8], offset: &mut usize) -> i32 {
    let v = i32::from_be_bytes(data[*offset..*offset + 4].try_into().unwrap());
    *offset += 4;
    v
}

pub fn get_u64(data: &[u8], offset: &mut usize) -> u64 {
    let v = u64::from_be_bytes(data[*offset..*offset + 8].try_into().unwrap());
    *offset += 8;
    v
}

pub fn get_double(data: &[u8], offset: &mut usize) -> f64 {
    let v = f64::from_be_bytes(data[*offset..*offset + 8].try_into().unwrap());
    *offset += 8;
    v
}

pub fn get_vector6d(data: &[u8], offset: &mut usize) -> Vec<f64> {
    (0..6).map(|_| get_double(data, offset)).collect()
}

pub fn get_vector6_i32(data: &[u8], offset: &mut usize) -> Vec<i32> {
    (0..6).map(|_| get_i32(data, offset)).collect()
}

pub fn put_u8(buf: &mut Vec<u8>, value: u8) {
    buf.push(value);
}

pub fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_be_bytes());
}

pub fn put_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

pub fn put_double(buf: &mut Vec<u8>, value: f64) {
    buf.extend_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_round_trip() {
        let mut buf = Vec::new();
        put_double(&mut buf, 125.0);
        assert_eq!(buf, [64, 95, 64, 0, 0, 0, 0, 0]);

        let mut offset = 0;
        assert_eq!(get_double(&buf, &mut offset), 125.0);
        assert_eq!(offset, 8);
    }

    #[test]
    fn integers_are_big_endian() {
        let mut buf = Vec::new();
        put_u16(&mut buf, 7);
        put_i32(&mut buf, -2);
        assert_eq!(buf, [0, 7, 255, 255, 255, 254]);

        let mut offset = 0;
        assert_eq!(get_u16(&buf, &mut offset), 7);
        assert_eq!(get_i32(&buf, &mut offset), -2);
    }

    #[test]
    fn reads_vector6d() {
        let mut buf = Vec::new();
        for i in 0..6 {
            put_double(&mut buf, i as f64 * 0.5);
        }
        let mut offset = 0;
        let v = get_vector6d(&buf, &mut offset);
        assert_eq!(v, vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5]);
        assert_eq!(offset, 48);
    }
}
