//! Sentinel-1 SAFE annotation decoding.
//!
//! Raw values are pulled from the annotation, calibration and noise XML files
//! by the [`primitive_catalog`] (an XPath and a conversion per
//! `file.variable` key). The [`compound_catalog`] then combines them through
//! the builders below into self-describing datasets; every variable carries
//! the XPath it came from in its `source` attribute.
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::core::compound::convert::{self, Convert};
use crate::core::compound::{CompoundSpec, Primitive, Primitives, execute, expect_args};
use crate::core::dataset::{Dataset, Variable};
use crate::core::layout::fan_out;
use crate::core::params::ReaderOptions;
use crate::core::tree::Tree;
use crate::error::{Error, Result};
use crate::io::{Mapper, decode_xml, select};
use crate::types::{ArrayData, DecodedNode, Markers, Scalar};

pub const ANNOTATION_GLOB: &str = "annotation/*.xml";

/// Where a primitive comes from and how its raw strings are typed
#[derive(Clone, Copy, Debug)]
pub struct PrimitiveSpec {
    pub xpath: &'static str,
    pub convert: Convert,
}

macro_rules! primitives {
    ($($key:literal => ($convert:path, $xpath:expr)),* $(,)?) => {
        [$(($key, PrimitiveSpec { xpath: $xpath, convert: $convert })),*]
    };
}

/// `file.variable` keys to their XPath and conversion
pub fn primitive_catalog() -> IndexMap<&'static str, PrimitiveSpec> {
    use convert::*;
    let table = primitives![
        "calibration.polarization" => (scalar, "/calibration/adsHeader/polarisation"),
        "calibration.line" => (int_array, "/calibration/calibrationVectorList/calibrationVector/line"),
        "calibration.sample" => (int_array_from_joined, "/calibration/calibrationVectorList/calibrationVector[1]/pixel"),
        "calibration.sigma0_lut" => (float_rows_from_strings, "/calibration/calibrationVectorList/calibrationVector/sigmaNought"),
        "calibration.gamma0_lut" => (float_rows_from_strings, "/calibration/calibrationVectorList/calibrationVector/gamma"),
        "calibration.azimuthTime" => (datetime_array, "/calibration/calibrationVectorList/calibrationVector/azimuthTime"),
        "noise.mode" => (scalar, "/noise/adsHeader/mode"),
        "noise.polarization" => (scalar, "/noise/adsHeader/polarisation"),
        // IPF before 2.9 names the range vectors noiseVector
        "noise.range.line" => (int_array, "/noise/noiseRangeVectorList/noiseRangeVector/line | /noise/noiseVectorList/noiseVector/line"),
        "noise.range.sample" => (int_arrays_from_strings, "/noise/noiseRangeVectorList/noiseRangeVector/pixel | /noise/noiseVectorList/noiseVector/pixel"),
        "noise.range.noiseLut" => (float_arrays_from_strings, "/noise/noiseRangeVectorList/noiseRangeVector/noiseRangeLut | /noise/noiseVectorList/noiseVector/noiseLut"),
        "noise.range.azimuthTime" => (datetime_array, "/noise/noiseRangeVectorList/noiseRangeVector/azimuthTime"),
        "noise.azi.swath" => (text_array, "/noise/noiseAzimuthVectorList/noiseAzimuthVector/swath"),
        "noise.azi.line" => (int_arrays_from_strings, "/noise/noiseAzimuthVectorList/noiseAzimuthVector/line"),
        "noise.azi.line_start" => (int_array, "/noise/noiseAzimuthVectorList/noiseAzimuthVector/firstAzimuthLine"),
        "noise.azi.line_stop" => (int_array, "/noise/noiseAzimuthVectorList/noiseAzimuthVector/lastAzimuthLine"),
        "noise.azi.sample_start" => (int_array, "/noise/noiseAzimuthVectorList/noiseAzimuthVector/firstRangeSample"),
        "noise.azi.sample_stop" => (int_array, "/noise/noiseAzimuthVectorList/noiseAzimuthVector/lastRangeSample"),
        "noise.azi.noiseLut" => (float_arrays_from_strings, "/noise/noiseAzimuthVectorList/noiseAzimuthVector/noiseAzimuthLut"),
        "annotation.product_type" => (scalar, "/product/adsHeader/productType"),
        "annotation.swath_subswath" => (scalar, "/product/adsHeader/swath"),
        "annotation.polarization" => (scalar, "/product/adsHeader/polarisation"),
        "annotation.line" => (uniq_sorted, "/product/geolocationGrid/geolocationGridPointList/geolocationGridPoint/line"),
        "annotation.sample" => (uniq_sorted, "/product/geolocationGrid/geolocationGridPointList/geolocationGridPoint/pixel"),
        "annotation.incidenceAngle" => (float_array, "/product/geolocationGrid/geolocationGridPointList/geolocationGridPoint/incidenceAngle"),
        "annotation.elevationAngle" => (float_array, "/product/geolocationGrid/geolocationGridPointList/geolocationGridPoint/elevationAngle"),
        "annotation.height" => (float_array, "/product/geolocationGrid/geolocationGridPointList/geolocationGridPoint/height"),
        "annotation.azimuthTime" => (datetime_array, "/product/geolocationGrid/geolocationGridPointList/geolocationGridPoint/azimuthTime"),
        "annotation.slantRangeTime" => (float_array, "/product/geolocationGrid/geolocationGridPointList/geolocationGridPoint/slantRangeTime"),
        "annotation.longitude" => (float_array, "/product/geolocationGrid/geolocationGridPointList/geolocationGridPoint/longitude"),
        "annotation.latitude" => (float_array, "/product/geolocationGrid/geolocationGridPointList/geolocationGridPoint/latitude"),
        "annotation.line_time_range" => (datetime_array, "/product/imageAnnotation/imageInformation/productFirstLineUtcTime | /product/imageAnnotation/imageInformation/productLastLineUtcTime"),
        "annotation.line_size" => (scalar, "/product/imageAnnotation/imageInformation/numberOfLines"),
        "annotation.sample_size" => (scalar, "/product/imageAnnotation/imageInformation/numberOfSamples"),
        "annotation.incidence_angle_mid_swath" => (scalar_float, "/product/imageAnnotation/imageInformation/incidenceAngleMidSwath"),
        "annotation.azimuth_time_interval" => (scalar_float, "/product/imageAnnotation/imageInformation/azimuthTimeInterval"),
        "annotation.slant_range_time_image" => (scalar_float, "/product/imageAnnotation/imageInformation/slantRangeTime"),
        "annotation.rangePixelSpacing" => (scalar_float, "/product/imageAnnotation/imageInformation/rangePixelSpacing"),
        "annotation.azimuthPixelSpacing" => (scalar_float, "/product/imageAnnotation/imageInformation/azimuthPixelSpacing"),
        "annotation.denoised" => (scalar, "/product/imageAnnotation/processingInformation/thermalNoiseCorrectionPerformed"),
        "annotation.pass" => (scalar, "/product/generalAnnotation/productInformation/pass"),
        "annotation.platform_heading" => (scalar_float, "/product/generalAnnotation/productInformation/platformHeading"),
        "annotation.radar_frequency" => (scalar_float, "/product/generalAnnotation/productInformation/radarFrequency"),
        "annotation.range_sampling_rate" => (scalar_float, "/product/generalAnnotation/productInformation/rangeSamplingRate"),
        "annotation.azimuth_steering_rate" => (scalar_float, "/product/generalAnnotation/productInformation/azimuthSteeringRate"),
        "annotation.orbit_time" => (datetime_array, "/product/generalAnnotation/orbitList/orbit/time"),
        "annotation.orbit_frame" => (text_array, "/product/generalAnnotation/orbitList/orbit/frame"),
        "annotation.orbit_pos_x" => (float_array, "/product/generalAnnotation/orbitList/orbit/position/x"),
        "annotation.orbit_pos_y" => (float_array, "/product/generalAnnotation/orbitList/orbit/position/y"),
        "annotation.orbit_pos_z" => (float_array, "/product/generalAnnotation/orbitList/orbit/position/z"),
        "annotation.orbit_vel_x" => (float_array, "/product/generalAnnotation/orbitList/orbit/velocity/x"),
        "annotation.orbit_vel_y" => (float_array, "/product/generalAnnotation/orbitList/orbit/velocity/y"),
        "annotation.orbit_vel_z" => (float_array, "/product/generalAnnotation/orbitList/orbit/velocity/z"),
        "annotation.number_of_bursts" => (scalar_int, "/product/swathTiming/burstList/@count"),
        "annotation.linesPerBurst" => (scalar, "/product/swathTiming/linesPerBurst"),
        "annotation.samplesPerBurst" => (scalar, "/product/swathTiming/samplesPerBurst"),
        "annotation.burst_azimuthTime" => (datetime_array, "/product/swathTiming/burstList/burst/azimuthTime"),
        "annotation.burst_azimuthAnxTime" => (float_array, "/product/swathTiming/burstList/burst/azimuthAnxTime"),
        "annotation.burst_sensingTime" => (datetime_array, "/product/swathTiming/burstList/burst/sensingTime"),
        "annotation.burst_byteOffset" => (int_array, "/product/swathTiming/burstList/burst/byteOffset"),
        "annotation.burst_firstValidSample" => (float_rows_from_strings, "/product/swathTiming/burstList/burst/firstValidSample"),
        "annotation.burst_lastValidSample" => (float_rows_from_strings, "/product/swathTiming/burstList/burst/lastValidSample"),
        "annotation.nb_dcestimate" => (scalar_int, "/product/dopplerCentroid/dcEstimateList/@count"),
        "annotation.nb_fineDce" => (scalar_int, "/product/dopplerCentroid/dcEstimateList/dcEstimate[1]/fineDceList/@count"),
        "annotation.dc_azimuth_time" => (datetime_array, "/product/dopplerCentroid/dcEstimateList/dcEstimate/azimuthTime"),
        "annotation.dc_t0" => (float_array, "/product/dopplerCentroid/dcEstimateList/dcEstimate/t0"),
        "annotation.dc_geoDcPoly" => (float_arrays_from_strings, "/product/dopplerCentroid/dcEstimateList/dcEstimate/geometryDcPolynomial"),
        "annotation.dc_dataDcPoly" => (float_arrays_from_strings, "/product/dopplerCentroid/dcEstimateList/dcEstimate/dataDcPolynomial"),
        "annotation.dc_rmserr" => (float_array, "/product/dopplerCentroid/dcEstimateList/dcEstimate/dataDcRmsError"),
        "annotation.dc_rmserrAboveThres" => (bool_array, "/product/dopplerCentroid/dcEstimateList/dcEstimate/dataDcRmsErrorAboveThreshold"),
        "annotation.dc_azstarttime" => (datetime_array, "/product/dopplerCentroid/dcEstimateList/dcEstimate/fineDceAzimuthStartTime"),
        "annotation.dc_azstoptime" => (datetime_array, "/product/dopplerCentroid/dcEstimateList/dcEstimate/fineDceAzimuthStopTime"),
        "annotation.dc_slantRangeTime" => (float_array, "/product/dopplerCentroid/dcEstimateList/dcEstimate/fineDceList/fineDce/slantRangeTime"),
        "annotation.dc_frequency" => (float_array, "/product/dopplerCentroid/dcEstimateList/dcEstimate/fineDceList/fineDce/frequency"),
        "annotation.fmrate_azimuthtime" => (datetime_array, "/product/generalAnnotation/azimuthFmRateList/azimuthFmRate/azimuthTime"),
        "annotation.fmrate_t0" => (float_array, "/product/generalAnnotation/azimuthFmRateList/azimuthFmRate/t0"),
        "annotation.fmrate_c0" => (float_array, "/product/generalAnnotation/azimuthFmRateList/azimuthFmRate/c0"),
        "annotation.fmrate_c1" => (float_array, "/product/generalAnnotation/azimuthFmRateList/azimuthFmRate/c1"),
        "annotation.fmrate_c2" => (float_array, "/product/generalAnnotation/azimuthFmRateList/azimuthFmRate/c2"),
        "annotation.fmrate_azimuthFmRatePolynomial" => (float_arrays_from_strings, "/product/generalAnnotation/azimuthFmRateList/azimuthFmRate/azimuthFmRatePolynomial"),
        "annotation.sm_nbPerSwat" => (int_array, "/product/swathMerging/swathMergeList/swathMerge/swathBoundsList/@count"),
        "annotation.sm_swath" => (text_array, "/product/swathMerging/swathMergeList/swathMerge/swath"),
        "annotation.sm_azimuthTime" => (datetime_array, "/product/swathMerging/swathMergeList/swathMerge/swathBoundsList/swathBounds/azimuthTime"),
        "annotation.sm_firstAzimuthLine" => (int_array, "/product/swathMerging/swathMergeList/swathMerge/swathBoundsList/swathBounds/firstAzimuthLine"),
        "annotation.sm_lastAzimuthLine" => (int_array, "/product/swathMerging/swathMergeList/swathMerge/swathBoundsList/swathBounds/lastAzimuthLine"),
        "annotation.sm_firstRangeSample" => (int_array, "/product/swathMerging/swathMergeList/swathMerge/swathBoundsList/swathBounds/firstRangeSample"),
        "annotation.sm_lastRangeSample" => (int_array, "/product/swathMerging/swathMergeList/swathMerge/swathBoundsList/swathBounds/lastRangeSample"),
    ];
    table.into_iter().collect()
}

/// Derived variable names to their builder and arguments
pub fn compound_catalog() -> IndexMap<String, CompoundSpec> {
    let grid = |values: &str| {
        CompoundSpec::new(geolocation_grid, ["annotation.line", "annotation.sample", values])
    };
    let noise_azimuth_args = [
        "noise.azi.line",
        "noise.azi.line_start",
        "noise.azi.line_stop",
        "noise.azi.sample_start",
        "noise.azi.sample_stop",
        "noise.azi.noiseLut",
        "noise.azi.swath",
    ];
    let mut catalog = IndexMap::new();
    catalog.insert(
        "luts_raw".to_string(),
        CompoundSpec::new(
            calibration_luts,
            [
                "calibration.line",
                "calibration.sample",
                "calibration.sigma0_lut",
                "calibration.gamma0_lut",
                "calibration.azimuthTime",
            ],
        ),
    );
    catalog.insert(
        "noise_lut_range_raw".to_string(),
        CompoundSpec::new(
            noise_range,
            ["noise.range.line", "noise.range.sample", "noise.range.noiseLut", "noise.range.azimuthTime"],
        ),
    );
    catalog.insert("noise_lut_azi_raw_grd".to_string(), CompoundSpec::new(noise_azimuth_grd, noise_azimuth_args));
    catalog.insert("noise_lut_azi_raw_slc".to_string(), CompoundSpec::new(noise_azimuth_slc, noise_azimuth_args));
    for name in ["incidenceAngle", "elevationAngle", "longitude", "latitude", "height", "azimuthTime", "slantRangeTime"] {
        catalog.insert(name.to_string(), grid(&format!("annotation.{}", name)));
    }
    catalog.insert(
        "bursts".to_string(),
        CompoundSpec::new(
            bursts,
            [
                "annotation.linesPerBurst",
                "annotation.samplesPerBurst",
                "annotation.burst_azimuthTime",
                "annotation.burst_azimuthAnxTime",
                "annotation.burst_sensingTime",
                "annotation.burst_byteOffset",
                "annotation.burst_firstValidSample",
                "annotation.burst_lastValidSample",
            ],
        ),
    );
    catalog.insert(
        "bursts_grd".to_string(),
        CompoundSpec::new(bursts_grd, ["annotation.linesPerBurst", "annotation.samplesPerBurst"]),
    );
    catalog.insert(
        "orbit".to_string(),
        CompoundSpec::new(
            orbit,
            [
                "annotation.orbit_time",
                "annotation.orbit_frame",
                "annotation.orbit_pos_x",
                "annotation.orbit_pos_y",
                "annotation.orbit_pos_z",
                "annotation.orbit_vel_x",
                "annotation.orbit_vel_y",
                "annotation.orbit_vel_z",
                "annotation.pass",
                "annotation.platform_heading",
            ],
        ),
    );
    catalog.insert(
        "image".to_string(),
        CompoundSpec::new(
            image,
            [
                "annotation.product_type",
                "annotation.line_time_range",
                "annotation.line_size",
                "annotation.sample_size",
                "annotation.incidence_angle_mid_swath",
                "annotation.azimuth_time_interval",
                "annotation.slant_range_time_image",
                "annotation.azimuthPixelSpacing",
                "annotation.rangePixelSpacing",
                "annotation.swath_subswath",
                "annotation.radar_frequency",
                "annotation.range_sampling_rate",
                "annotation.azimuth_steering_rate",
            ],
        ),
    );
    catalog.insert(
        "azimuth_fmrate".to_string(),
        CompoundSpec::new(
            azimuth_fmrate,
            [
                "annotation.fmrate_azimuthtime",
                "annotation.fmrate_t0",
                "annotation.fmrate_c0",
                "annotation.fmrate_c1",
                "annotation.fmrate_c2",
                "annotation.fmrate_azimuthFmRatePolynomial",
            ],
        ),
    );
    catalog.insert(
        "doppler_estimate".to_string(),
        CompoundSpec::new(
            doppler_estimate,
            [
                "annotation.nb_dcestimate",
                "annotation.nb_fineDce",
                "annotation.dc_azimuth_time",
                "annotation.dc_t0",
                "annotation.dc_geoDcPoly",
                "annotation.dc_dataDcPoly",
                "annotation.dc_rmserr",
                "annotation.dc_rmserrAboveThres",
                "annotation.dc_azstarttime",
                "annotation.dc_azstoptime",
                "annotation.dc_slantRangeTime",
                "annotation.dc_frequency",
            ],
        ),
    );
    catalog.insert(
        "swath_merging".to_string(),
        CompoundSpec::new(
            swath_merging,
            [
                "annotation.sm_swath",
                "annotation.sm_nbPerSwat",
                "annotation.sm_azimuthTime",
                "annotation.sm_firstAzimuthLine",
                "annotation.sm_lastAzimuthLine",
                "annotation.sm_firstRangeSample",
                "annotation.sm_lastRangeSample",
            ],
        ),
    );
    catalog
}

fn count(name: &str, p: &Primitive) -> Result<usize> {
    let n = p.as_i64()?;
    usize::try_from(n).map_err(|_| Error::builder(name, format!("negative count {} from {}", n, p.source)))
}

fn floats(name: &str, data: &ArrayData, source: &str) -> Result<Vec<f64>> {
    data.to_f64_vec()
        .ok_or_else(|| Error::builder(name, format!("{} is not numeric", source)))
}

/// First `n` entries along the leading axis
fn head(data: &ArrayData, n: usize) -> ArrayData {
    let positions: Vec<Option<usize>> = (0..n).map(Some).collect();
    data.take(0, &positions)
}

/// Rows of differing lengths as a 2-D float array padded with NaN
fn padded_rows(name: &str, p: &Primitive) -> Result<ArrayData> {
    let rows = p
        .rows()?
        .iter()
        .map(|r| floats(name, r, &p.source))
        .collect::<Result<Vec<_>>>()?;
    rows_to_array(rows)
}

fn rows_to_array(rows: Vec<Vec<f64>>) -> Result<ArrayData> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let nrows = rows.len();
    let flat: Vec<f64> = rows
        .into_iter()
        .flat_map(|mut r| {
            r.resize(width, f64::NAN);
            r
        })
        .collect();
    ArrayData::from_f64(flat).into_shape(&[nrows, width])
}

/// A grid point property reshaped to `(line, sample)`; the variable is
/// named after the last XPath step of its values
pub fn geolocation_grid(args: &[Primitive]) -> Result<Dataset> {
    let [line, sample, values] = expect_args::<3>("geolocation_grid", args)?;
    let shape = [line.array()?.len(), sample.array()?.len()];
    let data = values.array()?.clone().into_shape(&shape).map_err(|_| {
        Error::builder(
            "geolocation_grid",
            format!("{} values do not fill a {}x{} grid", values.array().map_or(0, ArrayData::len), shape[0], shape[1]),
        )
    })?;
    let name = values.source.rsplit('/').next().unwrap_or("values").to_string();
    Ok(Dataset::new()
        .with_coord("line", line.to_variable(&["line"])?)
        .with_coord("sample", sample.to_variable(&["sample"])?)
        .with_variable(
            name,
            Variable::new(["line", "sample"], data)?.with_attr("source", values.source.as_str()),
        ))
}

pub fn calibration_luts(args: &[Primitive]) -> Result<Dataset> {
    let [line, sample, sigma0, gamma0, azimuth_time] = expect_args::<5>("calibration_luts", args)?;
    Ok(Dataset::new()
        .with_coord("line", line.to_variable(&["line"])?)
        .with_coord("sample", sample.to_variable(&["sample"])?)
        .with_variable(
            "sigma0_lut",
            sigma0.to_variable(&["line", "sample"])?.with_attr("description", "look up table sigma0"),
        )
        .with_variable(
            "gamma0_lut",
            gamma0.to_variable(&["line", "sample"])?.with_attr("description", "look up table gamma0"),
        )
        .with_variable(
            "azimuthTime",
            azimuth_time
                .to_variable(&["line"])?
                .with_attr("description", "azimuth times associated to the signal look up table"),
        ))
}

/// Range noise vectors truncated to the shortest one
pub fn noise_range(args: &[Primitive]) -> Result<Dataset> {
    let [line, sample, lut, azimuth_time] = expect_args::<4>("noise_range", args)?;
    let luts = lut.rows()?;
    let samples = sample.rows()?;
    let width = luts
        .iter()
        .chain(samples.first())
        .map(ArrayData::len)
        .min()
        .unwrap_or(0);
    let rows = luts
        .iter()
        .map(|r| floats("noise_range", &head(r, width), &lut.source))
        .collect::<Result<Vec<_>>>()?;
    let first_samples = samples
        .first()
        .map(|s| head(s, width))
        .ok_or_else(|| Error::builder("noise_range", "no range noise vectors"))?;
    let nlines = line.array()?.len();
    let times = match azimuth_time.array() {
        Ok(times) if times.len() == nlines => {
            Variable::new(["line"], times.clone())?.with_attr("source", azimuth_time.source.as_str())
        }
        // older products carry no azimuth time per range vector
        _ => Variable::new(["line"], ArrayData::from_f64(vec![f64::NAN; nlines]))?,
    };
    Ok(Dataset::new()
        .with_coord("line", line.to_variable(&["line"])?)
        .with_coord(
            "sample",
            Variable::new(["sample"], first_samples)?.with_attr("source", sample.source.as_str()),
        )
        .with_variable(
            "noise_lut",
            Variable::new(["line", "sample"], rows_to_array(rows)?)?.with_attr("source", lut.source.as_str()),
        )
        .with_variable("azimuthTime", times))
}

fn swath_names(p: &Primitive) -> Result<Vec<String>> {
    Ok(p.array()?.to_scalars().into_iter().map(|s| s.to_string()).collect())
}

/// Azimuth noise vectors of a GRD product, one per swath. Vectors differ in
/// length, so each swath gets its own `line_<swath>` dimension.
pub fn noise_azimuth_grd(args: &[Primitive]) -> Result<Dataset> {
    let [line, line_start, line_stop, sample_start, sample_stop, lut, swath] =
        expect_args::<7>("noise_azimuth_grd", args)?;
    let swaths = swath_names(swath)?;
    let lines = line.rows()?;
    let luts = lut.rows()?;
    if lines.len() != swaths.len() || luts.len() != swaths.len() {
        return Err(Error::builder(
            "noise_azimuth_grd",
            format!("{} swaths, {} line vectors, {} noise vectors", swaths.len(), lines.len(), luts.len()),
        ));
    }
    let mut ds = Dataset::new().with_coord("swath", swath.to_variable(&["swath"])?);
    for (i, name) in swaths.iter().enumerate() {
        let dim = format!("line_{}", name);
        ds = ds
            .with_coord(dim.clone(), Variable::new([dim.as_str()], lines[i].clone())?.with_attr("source", line.source.as_str()))
            .with_variable(
                format!("noise_lut_{}", name),
                Variable::new([dim.as_str()], luts[i].clone())?.with_attr("source", lut.source.as_str()),
            );
    }
    for (name, p) in [
        ("line_start", line_start),
        ("line_stop", line_stop),
        ("sample_start", sample_start),
        ("sample_stop", sample_stop),
    ] {
        ds = ds.with_variable(name, p.to_variable(&["swath"])?);
    }
    Ok(ds)
}

/// Azimuth noise of the opened SLC subswath; wave mode has none and gets a
/// unit noise level
pub fn noise_azimuth_slc(args: &[Primitive]) -> Result<Dataset> {
    let [line, line_start, line_stop, sample_start, sample_stop, lut, swath] =
        expect_args::<7>("noise_azimuth_slc", args)?;
    let swaths = swath_names(swath)?;
    let bounds = [
        ("line_start", line_start),
        ("line_stop", line_stop),
        ("sample_start", sample_start),
        ("sample_stop", sample_stop),
    ];
    let Some(first_swath) = swaths.first() else {
        let mut ds = Dataset::new().with_variable("noise_lut", Variable::scalar(1.0));
        for (name, p) in bounds {
            ds = ds.with_variable(name, p.to_variable(&["swath"])?);
        }
        return Ok(ds);
    };
    let lines = line.rows()?.first().cloned().ok_or_else(|| Error::builder("noise_azimuth_slc", "no line vector"))?;
    let noise = lut.rows()?.first().cloned().ok_or_else(|| Error::builder("noise_azimuth_slc", "no noise vector"))?;
    let mut ds = Dataset::new()
        .with_coord("line", Variable::new(["line"], lines)?.with_attr("source", line.source.as_str()))
        .with_variable(
            "noise_lut",
            Variable::new(["line"], noise)?.with_attr("source", lut.source.as_str()),
        );
    for (name, p) in bounds {
        let values = p.array()?;
        if values.is_empty() {
            return Err(Error::builder("noise_azimuth_slc", format!("{} is empty", p.source)));
        }
        let first = head(values, 1).into_shape(&[])?;
        ds = ds.with_variable(
            name,
            Variable::new(Vec::<String>::new(), first)?
                .with_attr("source", p.source.as_str())
                .with_attr("swath", first_swath.as_str()),
        );
    }
    Ok(ds)
}

fn valid_samples(p: &Primitive) -> Result<Variable> {
    let data = p.array()?;
    let values: Vec<f64> = floats("bursts", data, &p.source)?
        .into_iter()
        .map(|v| if v == -1.0 { f64::NAN } else { v })
        .collect();
    let data = ArrayData::from_f64(values).into_shape(data.shape())?;
    Ok(Variable::new(["burst", "line"], data)?.with_attr("source", p.source.as_str()))
}

/// Burst timing; a `-1` valid sample marks an invalid line and becomes NaN
pub fn bursts(args: &[Primitive]) -> Result<Dataset> {
    let [lines_per_burst, samples_per_burst, azimuth_time, anx_time, sensing_time, byte_offset, first_valid, last_valid] =
        expect_args::<8>("bursts", args)?;
    let mut ds = Dataset::new();
    if lines_per_burst.as_i64()? != 0 || samples_per_burst.as_i64()? != 0 {
        ds = ds
            .with_variable("azimuthTime", azimuth_time.to_variable(&["burst"])?)
            .with_variable("azimuthAnxTime", anx_time.to_variable(&["burst"])?)
            .with_variable("sensingTime", sensing_time.to_variable(&["burst"])?)
            .with_variable("byteOffset", byte_offset.to_variable(&["burst"])?)
            .with_variable("firstValidSample", valid_samples(first_valid)?)
            .with_variable("lastValidSample", valid_samples(last_valid)?);
    }
    Ok(ds
        .with_variable("linesPerBurst", lines_per_burst.to_scalar_variable()?)
        .with_variable("samplesPerBurst", samples_per_burst.to_scalar_variable()?))
}

/// GRD products have no bursts
pub fn bursts_grd(args: &[Primitive]) -> Result<Dataset> {
    let [lines_per_burst, samples_per_burst] = expect_args::<2>("bursts_grd", args)?;
    Ok(Dataset::new()
        .with_variable("azimuthTime", Variable::new(["burst"], ArrayData::from_times(Vec::new()))?)
        .with_variable("linesPerBurst", lines_per_burst.to_scalar_variable()?)
        .with_variable("samplesPerBurst", samples_per_burst.to_scalar_variable()?))
}

pub fn orbit(args: &[Primitive]) -> Result<Dataset> {
    let [time, frame, pos_x, pos_y, pos_z, vel_x, vel_y, vel_z, orbit_pass, heading] =
        expect_args::<10>("orbit", args)?;
    let frames = frame.array()?.to_scalars();
    let earth_fixed = Scalar::from("Earth Fixed");
    if frames.is_empty() || frames.iter().any(|f| *f != earth_fixed) {
        return Err(Error::builder("orbit", "all orbit frames must be of type \"Earth Fixed\""));
    }
    let mut ds = Dataset::new()
        .with_coord("time", time.to_variable(&["time"])?)
        .with_attr("orbit_pass", orbit_pass.as_text()?)
        .with_attr("platform_heading", heading.as_f64()?)
        .with_attr("frame", earth_fixed);
    for (name, p) in [
        ("velocity_x", vel_x),
        ("velocity_y", vel_y),
        ("velocity_z", vel_z),
        ("position_x", pos_x),
        ("position_y", pos_y),
        ("position_z", pos_z),
    ] {
        ds = ds.with_variable(name, p.to_variable(&["time"])?);
    }
    Ok(ds)
}

/// Scalar description of the image; SLC spacing is projected to ground range
pub fn image(args: &[Primitive]) -> Result<Dataset> {
    let [product_type, line_time_range, line_size, sample_size, incidence_mid, azimuth_interval, slant_range_time, azimuth_spacing, range_spacing, swath, radar_frequency, range_sampling_rate, azimuth_steering_rate] =
        expect_args::<13>("image", args)?;
    let range = range_spacing.as_f64()?;
    let ground_range = match product_type.as_text()?.as_str() {
        "SLC" | "SL2" => range / incidence_mid.as_f64()?.to_radians().sin(),
        _ => range,
    };
    Ok(Dataset::new()
        .with_variable("LineUtcTime", line_time_range.to_variable(&["limits"])?)
        .with_variable("numberOfLines", line_size.to_scalar_variable()?)
        .with_variable("numberOfSamples", sample_size.to_scalar_variable()?)
        .with_variable("azimuthPixelSpacing", azimuth_spacing.to_scalar_variable()?)
        .with_variable("slantRangePixelSpacing", range_spacing.to_scalar_variable()?)
        .with_variable(
            "groundRangePixelSpacing",
            Variable::scalar(ground_range).with_attr("source", range_spacing.source.as_str()),
        )
        .with_variable("incidenceAngleMidSwath", incidence_mid.to_scalar_variable()?)
        .with_variable("azimuthTimeInterval", azimuth_interval.to_scalar_variable()?)
        .with_variable("slantRangeTime", slant_range_time.to_scalar_variable()?)
        .with_variable("swath_subswath", swath.to_scalar_variable()?)
        .with_variable("radarFrequency", radar_frequency.to_scalar_variable()?)
        .with_variable("rangeSamplingRate", range_sampling_rate.to_scalar_variable()?)
        .with_variable("azimuthSteeringRate", azimuth_steering_rate.to_scalar_variable()?))
}

/// Azimuth FM rate polynomials, one coefficient row per azimuth time. Older
/// products give the coefficients as separate `c0`, `c1`, `c2` lists.
pub fn azimuth_fmrate(args: &[Primitive]) -> Result<Dataset> {
    let [azimuth_time, t0, c0, c1, c2, polynomial] = expect_args::<6>("azimuth_fmrate", args)?;
    let legacy = [c0, c1, c2];
    let has_legacy = legacy.iter().map(|c| c.array().map_or(0, ArrayData::len)).sum::<usize>() != 0;
    let (coefficients, source) = if has_legacy && polynomial.rows()?.is_empty() {
        let columns = legacy
            .iter()
            .map(|c| floats("azimuth_fmrate", c.array()?, &c.source))
            .collect::<Result<Vec<_>>>()?;
        let nrows = columns[0].len();
        if columns.iter().any(|c| c.len() != nrows) {
            return Err(Error::builder("azimuth_fmrate", "c0, c1 and c2 differ in length"));
        }
        let rows: Vec<Vec<f64>> = (0..nrows).map(|i| columns.iter().map(|c| c[i]).collect()).collect();
        let source = legacy.iter().map(|c| c.source.as_str()).collect::<Vec<_>>().join("\n");
        (rows_to_array(rows)?, source)
    } else {
        (padded_rows("azimuth_fmrate", polynomial)?, polynomial.source.clone())
    };
    Ok(Dataset::new()
        .with_coord("azimuthTime", azimuth_time.to_variable(&["azimuthTime"])?)
        .with_variable("t0", t0.to_variable(&["azimuthTime"])?)
        .with_variable(
            "azimuthFmRatePolynomial",
            Variable::new(["azimuthTime", "degree"], coefficients)?.with_attr("source", source),
        ))
}

/// Doppler centroid estimates; the fine estimates arrive flat and are
/// reshaped by the two counts
pub fn doppler_estimate(args: &[Primitive]) -> Result<Dataset> {
    let [nb_estimates, nb_fine, azimuth_time, t0, geo_poly, data_poly, rms_error, rms_above, az_start, az_stop, slant_range_time, frequency] =
        expect_args::<12>("doppler_estimate", args)?;
    let shape = [count("doppler_estimate", nb_estimates)?, count("doppler_estimate", nb_fine)?];
    let fine = |p: &Primitive| -> Result<Variable> {
        let data = p.array()?.clone().into_shape(&shape).map_err(|_| {
            Error::builder("doppler_estimate", format!("{} does not fill {}x{}", p.source, shape[0], shape[1]))
        })?;
        Ok(Variable::new(["azimuthTime", "nb_fine_dce"], data)?.with_attr("source", p.source.as_str()))
    };
    // both polynomials share the degree dimension
    let geo = padded_rows("doppler_estimate", geo_poly)?;
    let data = padded_rows("doppler_estimate", data_poly)?;
    let degree = geo.shape()[1].max(data.shape()[1]);
    let widen = |a: ArrayData| a.pad_axis(1, degree);
    let fine_index: Vec<i64> = (0..shape[1] as i64).collect();
    Ok(Dataset::new()
        .with_coord("azimuthTime", azimuth_time.to_variable(&["azimuthTime"])?)
        .with_coord("nb_fine_dce", Variable::new(["nb_fine_dce"], ArrayData::from_i64(fine_index))?)
        .with_variable("t0", t0.to_variable(&["azimuthTime"])?)
        .with_variable(
            "geometryDcPolynomial",
            Variable::new(["azimuthTime", "degree"], widen(geo))?.with_attr("source", geo_poly.source.as_str()),
        )
        .with_variable(
            "dataDcPolynomial",
            Variable::new(["azimuthTime", "degree"], widen(data))?.with_attr("source", data_poly.source.as_str()),
        )
        .with_variable("fineDceAzimuthStartTime", az_start.to_variable(&["azimuthTime"])?)
        .with_variable("fineDceAzimuthStopTime", az_stop.to_variable(&["azimuthTime"])?)
        .with_variable("dataDcRmsError", rms_error.to_variable(&["azimuthTime"])?)
        .with_variable("slantRangeTime", fine(slant_range_time)?)
        .with_variable("frequency", fine(frequency)?)
        .with_variable("dataDcRmsErrorAboveThreshold", rms_above.to_variable(&["azimuthTime"])?))
}

/// How the swaths of a GRD product were stitched; swath names are reduced
/// to their number (`IW2` is 2) and repeated once per bound
pub fn swath_merging(args: &[Primitive]) -> Result<Dataset> {
    let [swath, per_swath, azimuth_time, first_line, last_line, first_sample, last_sample] =
        expect_args::<7>("swath_merging", args)?;
    let names = swath_names(swath)?;
    let repeats = per_swath
        .array()?
        .to_i64_vec()
        .ok_or_else(|| Error::builder("swath_merging", format!("{} is not integer", per_swath.source)))?;
    if repeats.len() != names.len() {
        return Err(Error::builder(
            "swath_merging",
            format!("{} swaths for {} bound counts", names.len(), repeats.len()),
        ));
    }
    let mut numbers = Vec::new();
    for (name, n) in names.iter().zip(repeats) {
        let number = name
            .chars()
            .last()
            .and_then(|c| c.to_digit(10))
            .ok_or_else(|| Error::builder("swath_merging", format!("swath `{}` has no number", name)))?;
        let count = usize::try_from(n).map_err(|_| {
            Error::schema(per_swath.source.as_str(), format!("negative bound count {} for swath `{}`", n, name))
        })?;
        numbers.extend(std::iter::repeat_n(i64::from(number), count));
    }
    const DIM: &str = "dim_azimuthTime";
    Ok(Dataset::new()
        .with_variable("swaths", Variable::new([DIM], ArrayData::from_i64(numbers))?.with_attr("source", swath.source.as_str()))
        .with_variable("azimuthTime", azimuth_time.to_variable(&[DIM])?)
        .with_variable("firstAzimuthLine", first_line.to_variable(&[DIM])?)
        .with_variable("lastAzimuthLine", last_line.to_variable(&[DIM])?)
        .with_variable("firstRangeSample", first_sample.to_variable(&[DIM])?)
        .with_variable("lastRangeSample", last_sample.to_variable(&[DIM])?)
        .with_attr(
            "comment",
            "The swath merging data set record contains information about how multiple swaths were \
             stitched together to form one large contiguous swath. This data set record only applies \
             to IW and EW GRD products",
        )
        .with_attr("source", "Sentinel-1 Product Specification"))
}

/// Decode every primitive whose file is in `docs` (keyed by file kind:
/// `annotation`, `calibration`, `noise`). Primitives whose text cannot be
/// converted are left out; the compounds needing them then fail alone.
pub fn read_primitives(
    docs: &IndexMap<String, DecodedNode>,
    catalog: &IndexMap<&'static str, PrimitiveSpec>,
    markers: &Markers,
) -> Result<Primitives> {
    let mut primitives = Primitives::new();
    for (key, spec) in catalog {
        let file = key.split('.').next().unwrap_or_default();
        let Some(doc) = docs.get(file) else {
            continue;
        };
        let texts = select(doc, spec.xpath, markers)?;
        match (spec.convert)(&texts) {
            Ok(value) => {
                primitives.insert(key.to_string(), Primitive::new(value, spec.xpath));
            }
            Err(e) => debug!("skipping primitive {} ({}): {}", key, spec.xpath, e),
        }
    }
    Ok(primitives)
}

/// Calibration and noise files of an annotation file
pub fn companion_files(annotation_key: &str) -> (String, String) {
    let (dir, name) = annotation_key.rsplit_once('/').unwrap_or(("", annotation_key));
    let join = |kind: &str| {
        if dir.is_empty() {
            format!("calibration/{}-{}", kind, name)
        } else {
            format!("{}/calibration/{}-{}", dir, kind, name)
        }
    };
    (join("calibration"), join("noise"))
}

/// Every compound of one swath. Compounds whose inputs are absent (bursts
/// of a GRD product, swath merging of an SLC) are skipped with a warning.
pub fn read_compounds<M: Mapper + ?Sized>(mapper: &M, annotation_key: &str, options: &ReaderOptions) -> Result<Tree> {
    let markers = options.markers();
    let (calibration_key, noise_key) = companion_files(annotation_key);
    let mut docs = IndexMap::new();
    for (kind, key) in [
        ("annotation", annotation_key),
        ("calibration", calibration_key.as_str()),
        ("noise", noise_key.as_str()),
    ] {
        info!("reading {}", key);
        docs.insert(kind.to_string(), decode_xml(&mapper.read(key)?, &markers)?);
    }
    let primitives = read_primitives(&docs, &primitive_catalog(), &markers)?;
    let mut tree = Tree::new();
    for (name, spec) in compound_catalog() {
        match execute(&primitives, &spec) {
            Ok(ds) => tree = tree.insert(&name, ds)?,
            Err(e) => warn!("compound {} unavailable: {}", name, e),
        }
    }
    Ok(tree)
}

/// Annotation files of a SAFE product, one per swath and polarisation
pub fn annotation_files<M: Mapper + ?Sized>(mapper: &M) -> Result<Vec<String>> {
    Ok(mapper.glob(ANNOTATION_GLOB)?)
}

/// Compounds of every swath, each under `/<annotation file stem>`
pub fn read_swaths<M: Mapper + ?Sized>(mapper: &M, options: &ReaderOptions) -> Result<Tree> {
    let files = annotation_files(mapper)?;
    if files.is_empty() {
        return Err(Error::missing(ANNOTATION_GLOB));
    }
    let swaths = fan_out(&files, options.max_parallelism, |key| read_compounds(mapper, key, options));
    let mut tree = Tree::new();
    for (key, swath) in files.iter().zip(swaths) {
        let name = key.rsplit('/').next().unwrap_or(key);
        let stem = name.strip_suffix(".xml").unwrap_or(name);
        tree = tree.graft(stem, swath?)?;
    }
    Ok(tree)
}
