use crate::types::SkyPosition;

/// Name a source from its position, rounded to whole seconds of RA and Dec;
/// `survey` is prepended followed by a space.
pub fn iau_name(position: &SkyPosition, survey: Option<&str>) -> String {
    let ra_seconds = (position.ra.rem_euclid(360.0) / 15.0 * 3600.0).round() as u64 % 86_400;
    let (h, m, s) = (ra_seconds / 3600, (ra_seconds / 60) % 60, ra_seconds % 60);

    let sign = if position.dec < 0.0 { '-' } else { '+' };
    let dec_seconds = (position.dec.abs() * 3600.0).round() as u64;
    let (d, dm, ds) = (dec_seconds / 3600, (dec_seconds / 60) % 60, dec_seconds % 60);

    let name = format!("J{:02}{:02}{:02}{}{:02}{:02}{:02}", h, m, s, sign, d, dm, ds);
    match survey.map(str::trim).filter(|s| !s.is_empty()) {
        Some(survey) => format!("{} {}", survey, name),
        None => name,
    }
}

/// Pointing id derived from the observed object name
pub fn pointing_id(object: &str) -> String {
    format!("PT-{}", object.replace('\'', "").trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iau_name_exact_values() {
        let pos = SkyPosition::new(10.0, 20.0);
        assert_eq!(iau_name(&pos, None), "J004000+200000");
        assert_eq!(iau_name(&pos, Some("LoLSS")), "LoLSS J004000+200000");
    }

    #[test]
    fn test_iau_name_rounds_and_signs() {
        // 17h03m01.9992s, -30d30m01.5012s
        let pos = SkyPosition::new(255.75833, -30.500417);
        assert_eq!(iau_name(&pos, None), "J170302-303002");
    }

    #[test]
    fn test_iau_name_rounding_carries() {
        // 00h59m59.6s, +09d59m59.7s
        let pos = SkyPosition::new(15.0 * (3599.6 / 3600.0), 9.0 + 3599.7 / 3600.0);
        assert_eq!(iau_name(&pos, None), "J010000+100000");
    }

    #[test]
    fn test_pointing_id_strips_quotes() {
        assert_eq!(pointing_id("'A2256'"), "PT-A2256");
    }
}
