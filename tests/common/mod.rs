//! On-disk product fixtures shared by the integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::Path;

pub const RCM_PRODUCT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<product xmlns="rcmGsProductSchema" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <productId>RCM1_OK0000000_PK0000000_1_SC30M_20220101_000000_HH_HV_GRD</productId>
  <securityAttributes>
    <securityClassification>Unclassified</securityClassification>
  </securityAttributes>
  <imageReferenceAttributes>
    <productFormat>GeoTIFF</productFormat>
    <incidenceAngleFileName>incidenceAngles.xml</incidenceAngleFileName>
    <geographicInformation>
      <ellipsoidParameters>
        <ellipsoidName>WGS 1984</ellipsoidName>
        <semiMajorAxis units="m">6378137.0</semiMajorAxis>
        <semiMinorAxis units="m">6356752.314245179</semiMinorAxis>
      </ellipsoidParameters>
      <geolocationGrid>
        <imageTiePoint>
          <imageCoordinate><line>0</line><pixel>0</pixel></imageCoordinate>
          <geodeticCoordinate><latitude units="deg">45.1</latitude><longitude units="deg">-70.2</longitude></geodeticCoordinate>
        </imageTiePoint>
        <imageTiePoint>
          <imageCoordinate><line>0</line><pixel>500</pixel></imageCoordinate>
          <geodeticCoordinate><latitude units="deg">45.2</latitude><longitude units="deg">-70.8</longitude></geodeticCoordinate>
        </imageTiePoint>
        <imageTiePoint>
          <imageCoordinate><line>400</line><pixel>0</pixel></imageCoordinate>
          <geodeticCoordinate><latitude units="deg">44.6</latitude><longitude units="deg">-70.3</longitude></geodeticCoordinate>
        </imageTiePoint>
      </geolocationGrid>
      <rationalFunctions>
        <biasError units="m">2.5</biasError>
        <lineOffset>400</lineOffset>
        <lineNumeratorCoefficients>0.1 0.2 0.3 0.4</lineNumeratorCoefficients>
        <pixelNumeratorCoefficients>0.5 0.6 0.7 0.8</pixelNumeratorCoefficients>
      </rationalFunctions>
    </geographicInformation>
  </imageReferenceAttributes>
</product>"#;

pub fn rcm_noise(offset: f64) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<noiseLevels xmlns="rcmGsProductSchema">
  <referenceNoiseLevel>
    <sarCalibrationType>Beta Nought</sarCalibrationType>
    <pixelFirstNoiseValue>0</pixelFirstNoiseValue>
    <stepSize>100</stepSize>
    <numberOfValues>3</numberOfValues>
    <noiseLevelValues units="dB">{a} -21.5 -22.5</noiseLevelValues>
  </referenceNoiseLevel>
  <referenceNoiseLevel>
    <sarCalibrationType>Sigma Nought</sarCalibrationType>
    <pixelFirstNoiseValue>0</pixelFirstNoiseValue>
    <stepSize>100</stepSize>
    <numberOfValues>2</numberOfValues>
    <noiseLevelValues units="dB">{b} -24.5</noiseLevelValues>
  </referenceNoiseLevel>
  <perBeamReferenceNoiseLevel>
    <sarCalibrationType>Beta Nought</sarCalibrationType>
    <beam>S7</beam>
    <pixelFirstNoiseValue>0</pixelFirstNoiseValue>
    <stepSize>100</stepSize>
    <noiseLevelValues units="dB">-25.5 -26.5</noiseLevelValues>
  </perBeamReferenceNoiseLevel>
  <azimuthNoiseLevelScaling>
    <beam>S7</beam>
    <pixelFirstNoiseValue>0</pixelFirstNoiseValue>
    <stepSize>1000</stepSize>
    <noiseLevelScalingValues units="dB">0.25 0.5 0.75</noiseLevelScalingValues>
  </azimuthNoiseLevelScaling>
  <azimuthNoiseLevelScaling>
    <beam>S7</beam>
    <pixelFirstNoiseValue>0</pixelFirstNoiseValue>
    <stepSize>1000</stepSize>
    <noiseLevelScalingValues units="dB">1.25 1.5</noiseLevelScalingValues>
  </azimuthNoiseLevelScaling>
</noiseLevels>"#,
        a = -20.5 + offset,
        b = -23.5 + offset,
    )
}

pub const RCM_INCIDENCE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<incidenceAngles xmlns="rcmGsProductSchema">
  <productId>RCM1_TEST</productId>
  <pixelFirstAnglesValue>0</pixelFirstAnglesValue>
  <stepSize>250</stepSize>
  <numberOfValues>4</numberOfValues>
  <angles units="deg">19.5 20.25 21.0 21.75</angles>
</incidenceAngles>"#;

fn write(root: &Path, key: &str, text: &str) {
    let path = root.join(key);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, text).unwrap();
}

/// RCM product with HH and HV noise level files
pub fn write_rcm(root: &Path) {
    write(root, "metadata/product.xml", RCM_PRODUCT);
    write(root, "metadata/calibration/noiseLevels_HH.xml", &rcm_noise(0.0));
    write(root, "metadata/calibration/noiseLevels_HV.xml", &rcm_noise(-3.0));
    write(root, "metadata/calibration/incidenceAngles.xml", RCM_INCIDENCE);
}

pub const S1_STEM: &str = "s1a-iw1-slc-vv-20200101t000000-20200101t000005-000001-000001-004";

fn grid_point(line: i64, pixel: i64, lat: f64) -> String {
    format!(
        "<geolocationGridPoint>\
           <azimuthTime>2020-01-01T00:00:0{s}.000000</azimuthTime>\
           <slantRangeTime>5.3e-03</slantRangeTime>\
           <line>{line}</line><pixel>{pixel}</pixel>\
           <latitude>{lat}</latitude><longitude>{lon}</longitude><height>12.5</height>\
           <incidenceAngle>30.5</incidenceAngle><elevationAngle>27.25</elevationAngle>\
         </geolocationGridPoint>",
        s = line / 10,
        lon = lat - 80.0,
    )
}

fn orbit_state(second: u32) -> String {
    format!(
        "<orbit>\
           <time>2020-01-01T00:00:0{second}.000000</time><frame>Earth Fixed</frame>\
           <position><x>3.5e6</x><y>-1.5e6</y><z>5.25e6</z></position>\
           <velocity><x>5.5e3</x><y>1.5e3</y><z>-4.25e3</z></velocity>\
         </orbit>"
    )
}

pub fn s1_annotation() -> String {
    let points: String = [(0, 0, 45.0), (0, 99, 45.5), (49, 0, 44.5), (49, 99, 44.75)]
        .iter()
        .map(|&(l, p, lat)| grid_point(l, p, lat))
        .collect();
    let orbits: String = (0..3).map(orbit_state).collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<product>
  <adsHeader><swath>IW1</swath><polarisation>VV</polarisation><productType>SLC</productType><mode>IW</mode></adsHeader>
  <generalAnnotation>
    <productInformation>
      <pass>Ascending</pass>
      <platformHeading>-12.5</platformHeading>
      <radarFrequency>5.405e9</radarFrequency>
      <rangeSamplingRate>6.4e7</rangeSamplingRate>
      <azimuthSteeringRate>1.59</azimuthSteeringRate>
    </productInformation>
    <orbitList count="3">{orbits}</orbitList>
  </generalAnnotation>
  <imageAnnotation>
    <imageInformation>
      <productFirstLineUtcTime>2020-01-01T00:00:01.000000</productFirstLineUtcTime>
      <productLastLineUtcTime>2020-01-01T00:00:05.000000</productLastLineUtcTime>
      <slantRangeTime>5.3e-03</slantRangeTime>
      <rangePixelSpacing>2.5</rangePixelSpacing>
      <azimuthPixelSpacing>14.0</azimuthPixelSpacing>
      <azimuthTimeInterval>2.0e-03</azimuthTimeInterval>
      <numberOfSamples>100</numberOfSamples>
      <numberOfLines>50</numberOfLines>
      <incidenceAngleMidSwath>30.0</incidenceAngleMidSwath>
    </imageInformation>
  </imageAnnotation>
  <geolocationGrid>
    <geolocationGridPointList count="4">{points}</geolocationGridPointList>
  </geolocationGrid>
</product>"#
    )
}

pub const S1_CALIBRATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<calibration>
  <adsHeader><polarisation>VV</polarisation></adsHeader>
  <calibrationVectorList count="2">
    <calibrationVector>
      <azimuthTime>2020-01-01T00:00:01.000000</azimuthTime>
      <line>0</line>
      <pixel>0 50 99</pixel>
      <sigmaNought>2.5e2 2.6e2 2.7e2</sigmaNought>
      <gamma>2.25e2 2.35e2 2.45e2</gamma>
    </calibrationVector>
    <calibrationVector>
      <azimuthTime>2020-01-01T00:00:05.000000</azimuthTime>
      <line>49</line>
      <pixel>0 50 99</pixel>
      <sigmaNought>2.75e2 2.85e2 2.95e2</sigmaNought>
      <gamma>2.5e2 2.6e2 2.7e2</gamma>
    </calibrationVector>
  </calibrationVectorList>
</calibration>"#;

pub const S1_NOISE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<noise>
  <adsHeader><polarisation>VV</polarisation><mode>IW</mode></adsHeader>
  <noiseRangeVectorList count="2">
    <noiseRangeVector>
      <azimuthTime>2020-01-01T00:00:01.000000</azimuthTime>
      <line>0</line>
      <pixel>0 40 80 99</pixel>
      <noiseRangeLut>1.5 1.25 1.0 0.75</noiseRangeLut>
    </noiseRangeVector>
    <noiseRangeVector>
      <azimuthTime>2020-01-01T00:00:05.000000</azimuthTime>
      <line>49</line>
      <pixel>0 40 80</pixel>
      <noiseRangeLut>1.75 1.5 1.25</noiseRangeLut>
    </noiseRangeVector>
  </noiseRangeVectorList>
</noise>"#;

/// Single-swath SAFE directory
pub fn write_safe(root: &Path) {
    write(root, &format!("annotation/{}.xml", S1_STEM), &s1_annotation());
    write(root, &format!("annotation/calibration/calibration-{}.xml", S1_STEM), S1_CALIBRATION);
    write(root, &format!("annotation/calibration/noise-{}.xml", S1_STEM), S1_NOISE);
}
