use crate::config::MountpointConfig;
use rsgnss::prelude::*;
use std::str::FromStr;

impl FromStr for MountpointConfig {
    type Err = String;

    /// `url#FORMAT[@latitude,longitude]`, the format defaults to RTCM 3.
    ///
    /// Credentials in the url may contain `@`: only the part after `#` is
    /// searched for a position.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (url, tail) = match s.rsplit_once('#') {
            Some((url, tail)) => (url, Some(tail)),
            None => (s, None),
        };
        let (format, position) = match tail {
            None => ("", None),
            Some(tail) => match tail.split_once('@') {
                Some((format, position)) => (format, Some(position)),
                None => (tail, None),
            },
        };
        let format = if format.is_empty() { "RTCM_3" } else { format };
        Format::from_tag(format).map_err(|e| e.to_string())?;

        let mut config = MountpointConfig {
            url: url.to_string(),
            format: format.to_string(),
            latitude: None,
            longitude: None,
            nmea: false,
            ntrip_version: NtripVersion::default(),
        };
        config.mountpoint().map_err(|e| e.to_string())?;

        if let Some(position) = position {
            let (lat, lon) = position
                .split_once(',')
                .ok_or_else(|| format!("invalid position: {position}"))?;
            let lat = lat.trim().parse::<f64>().map_err(|e| e.to_string())?;
            let lon = lon.trim().parse::<f64>().map_err(|e| e.to_string())?;
            if !(-90. ..=90.).contains(&lat) || !(-180. ..=180.).contains(&lon)
            {
                return Err(format!("position out of range: {position}"));
            }
            config.latitude = Some(lat);
            config.longitude = Some(lon);
            config.nmea = true;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_source() {
        let source =
            MountpointConfig::from_str("www.euref-ip.net:2101/WTZR0").unwrap();
        assert_eq!(source.format, "RTCM_3");
        assert_eq!(source.position(), None);

        let source = MountpointConfig::from_str(
            "ntrip://user:p@ss@www.igs-ip.net:2101/ALIC0#RTIGS@-23.67,133.88",
        )
        .unwrap();
        assert_eq!(source.url, "ntrip://user:p@ss@www.igs-ip.net:2101/ALIC0");
        assert_eq!(source.format, "RTIGS");
        assert_eq!(source.position(), Some((-23.67, 133.88)));

        let source =
            MountpointConfig::from_str("ntrip://caster:2101/RAW0#ZERO").unwrap();
        assert_eq!(source.format, "ZERO");
        assert_eq!(source.mountpoint().unwrap().station(), "RAW0");

        assert!(MountpointConfig::from_str("caster:2101/X#CMR").is_err());
        assert!(MountpointConfig::from_str("caster:2101/X#RTCM_3@43.6").is_err());
        assert!(MountpointConfig::from_str("caster:2101/X#RTCM_3@95,1").is_err());
        assert!(MountpointConfig::from_str("caster:2101#RTCM_3").is_err());
    }
}
