//! HDF5 containers for L1 datasets and the L2 archival file.
//!
//! L1 files hold one `bitstring_<N>` group per dataset. L2 files stack all
//! records along a leading bitstring axis.

use crate::{Error, Result};
use eltm_core::{
    Axis, Dataset, Electrode, Epoch, GlobalAttributes, ReducedDataset, COUNTS_AXES, COUNTS_SHAPE,
    ENERGY_AXES, ENERGY_SHAPE, HV_AXES, HV_SHAPE, NUM_CYCLES, NUM_ENERGY,
};
use hdf5::types::{H5Type, VarLenUnicode};
use hdf5::{File, Group, Location};
use ndarray::{Array, Array2, Array3, ArrayBase, ArrayView1, Data, Dimension, Ix2, Ix4, IxDyn};
use std::path::Path;
use std::str::FromStr;

const FORMAT_ATTR: &str = "eltm_format";
const ORDER_ATTR: &str = "eltm_attribute_order";
const L1_FORMAT: &str = "eltm-l1";
const L2_FORMAT: &str = "eltm-l2";
const GROUP_PREFIX: &str = "bitstring_";
const EPOCH_UNITS: &str = "ms since 1970-01-01";
const L2_AXES: [&str; 3] = ["bitstring", "energy", "cycle"];

/// HDF5 write configuration.
#[derive(Clone, Debug)]
pub struct Hdf5WriteOptions {
    /// Deflate level for array datasets, `None` to store uncompressed.
    pub compression: Option<u8>,
    /// Apply the shuffle filter before compression.
    pub shuffle: bool,
}

impl Default for Hdf5WriteOptions {
    fn default() -> Self {
        Self {
            compression: Some(1),
            shuffle: true,
        }
    }
}

impl Hdf5WriteOptions {
    /// Options that store every dataset uncompressed.
    #[must_use]
    pub fn uncompressed() -> Self {
        Self {
            compression: None,
            shuffle: false,
        }
    }

    fn filters(&self, len: usize) -> (Option<u8>, bool) {
        // Filtered datasets need chunks, which cannot be empty.
        if len == 0 {
            (None, false)
        } else {
            (self.compression, self.shuffle)
        }
    }
}

/// Records and metadata of an L2 archival file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct L2Archive {
    /// Reduced records in file order.
    pub records: Vec<ReducedDataset>,
    /// File-level provenance attributes.
    pub global_attributes: GlobalAttributes,
}

/// Writes L1 datasets, one group per bitstring.
///
/// Global attributes of the first dataset become file attributes; a dataset
/// whose attributes differ also carries its own on its group.
///
/// # Errors
/// Returns an error if HDF5 I/O fails, a dataset has the wrong dimensions or
/// a timestamp cannot be rendered.
pub fn write_l1_hdf5<P: AsRef<Path>>(
    path: P,
    datasets: &[Dataset],
    options: &Hdf5WriteOptions,
) -> Result<()> {
    for dataset in datasets {
        dataset.validate_dimensions()?;
    }

    let file = File::create(path)?;
    set_attr_str(&file, FORMAT_ATTR, L1_FORMAT)?;
    let file_attrs = datasets
        .first()
        .map(|d| d.global_attributes.clone())
        .unwrap_or_default();
    write_global_attributes(&file, &file_attrs)?;

    for dataset in datasets {
        let group = file.create_group(&format!("{GROUP_PREFIX}{}", dataset.index))?;
        write_l1_group(&group, dataset, options)?;
        if dataset.global_attributes != file_attrs {
            write_global_attributes(&group, &dataset.global_attributes)?;
        }
    }

    log::info!("wrote {} L1 datasets as HDF5", datasets.len());
    Ok(())
}

/// Reads L1 datasets written by [`write_l1_hdf5`], in ascending index order.
///
/// Range anomalies are not stored in the container, so every returned
/// dataset has an empty anomaly list.
///
/// # Errors
/// Returns an error if HDF5 I/O fails or the file is not an L1 container.
pub fn read_l1_hdf5<P: AsRef<Path>>(path: P) -> Result<Vec<Dataset>> {
    let file = File::open(path)?;
    check_format(&file, L1_FORMAT)?;
    let file_attrs = read_global_attributes(&file)?.unwrap_or_default();

    let mut indices: Vec<(u32, String)> = file
        .member_names()?
        .into_iter()
        .filter_map(|name| {
            let index = name.strip_prefix(GROUP_PREFIX)?.parse().ok()?;
            Some((index, name))
        })
        .collect();
    indices.sort_unstable();

    indices
        .into_iter()
        .map(|(index, name)| {
            let group = file.group(&name)?;
            let mut dataset = read_l1_group(&group, index)?;
            dataset.global_attributes = match read_global_attributes(&group)? {
                Some(attrs) => attrs,
                None => file_attrs.clone(),
            };
            dataset.validate_dimensions()?;
            Ok(dataset)
        })
        .collect()
}

/// Writes the L2 archival file.
///
/// # Errors
/// Returns an error if HDF5 I/O fails or a record has the wrong dimensions.
pub fn write_l2_hdf5<P: AsRef<Path>>(
    path: P,
    records: &[ReducedDataset],
    attributes: &GlobalAttributes,
    options: &Hdf5WriteOptions,
) -> Result<()> {
    for record in records {
        record.validate_dimensions()?;
    }

    let file = File::create(path)?;
    set_attr_str(&file, FORMAT_ATTR, L2_FORMAT)?;
    write_global_attributes(&file, attributes)?;

    let n = records.len();
    let (compression, shuffle) = options.filters(n);

    let index: Vec<u32> = records.iter().map(|r| r.index).collect();
    let index_ds =
        create_fixed_dataset::<u32, _>(&file, "bitstring_index", (n,), compression, shuffle)?;
    set_attr_str(&index_ds, "DESCRIPTION", "Index of the source bitstring")?;

    let total_ds = create_fixed_dataset::<u64, _>(
        &file,
        "total_counts_per_energy",
        (n, NUM_ENERGY, NUM_CYCLES),
        compression,
        shuffle,
    )?;
    set_attr_str(&total_ds, "DESCRIPTION", "Electron counts summed over azimuthal and incident angles")?;
    set_attr_str_array(&total_ds, "axes", &L2_AXES)?;

    let mean_ds = create_fixed_dataset::<f64, _>(
        &file,
        "mean_counts_per_energy",
        (n, NUM_ENERGY, NUM_CYCLES),
        compression,
        shuffle,
    )?;
    set_attr_str(&mean_ds, "DESCRIPTION", "Electron counts averaged over azimuthal and incident angles")?;
    set_attr_str_array(&mean_ds, "axes", &L2_AXES)?;

    let epoch_ds =
        create_fixed_dataset::<u64, _>(&file, "epoch", (n, NUM_CYCLES), compression, shuffle)?;
    set_attr_str(&epoch_ds, "UNITS", EPOCH_UNITS)?;
    set_attr_str(&epoch_ds, "DESCRIPTION", "Start time of each cycle")?;

    let duration_ds =
        create_fixed_dataset::<f64, _>(&file, "duration", (n, NUM_CYCLES), compression, shuffle)?;
    set_attr_str(&duration_ds, "UNITS", "s")?;
    set_attr_str(&duration_ds, "DESCRIPTION", "Data-taking duration of each cycle")?;

    if n > 0 {
        let stacked = (n, NUM_ENERGY, NUM_CYCLES);
        let per_cycle = (n, NUM_CYCLES);
        index_ds.write(ArrayView1::from(index.as_slice()))?;
        total_ds.write(&Array3::from_shape_fn(stacked, |(r, e, c)| {
            records[r].total_counts_per_energy[[e, c]]
        }))?;
        mean_ds.write(&Array3::from_shape_fn(stacked, |(r, e, c)| {
            records[r].mean_counts_per_energy[[e, c]]
        }))?;
        epoch_ds.write(&Array2::from_shape_fn(per_cycle, |(r, c)| {
            records[r].epoch[c].timestamp_ms
        }))?;
        duration_ds.write(&Array2::from_shape_fn(per_cycle, |(r, c)| records[r].duration[c]))?;
    }

    log::info!("wrote {n} L2 records as HDF5");
    Ok(())
}

/// Reads the L2 archival file written by [`write_l2_hdf5`].
///
/// # Errors
/// Returns an error if HDF5 I/O fails or the file is not an L2 container.
pub fn read_l2_hdf5<P: AsRef<Path>>(path: P) -> Result<L2Archive> {
    let file = File::open(path)?;
    check_format(&file, L2_FORMAT)?;

    let index = read_dataset_vec::<u32>(&file, "bitstring_index")?;
    let n = index.len();
    let total: Array3<u64> =
        read_array(&file, "total_counts_per_energy", &[n, NUM_ENERGY, NUM_CYCLES])?;
    let mean: Array3<f64> =
        read_array(&file, "mean_counts_per_energy", &[n, NUM_ENERGY, NUM_CYCLES])?;
    let epoch: Array2<u64> = read_array(&file, "epoch", &[n, NUM_CYCLES])?;
    let duration: Array2<f64> = read_array(&file, "duration", &[n, NUM_CYCLES])?;

    let records = index
        .iter()
        .enumerate()
        .map(|(r, &index)| {
            let record = ReducedDataset {
                index,
                total_counts_per_energy: total.index_axis(ndarray::Axis(0), r).to_owned(),
                mean_counts_per_energy: mean.index_axis(ndarray::Axis(0), r).to_owned(),
                epoch: to_epochs(epoch.row(r).iter().copied())?,
                duration: duration.row(r).to_vec(),
            };
            record.validate_dimensions()?;
            Ok(record)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(L2Archive {
        records,
        global_attributes: read_global_attributes(&file)?.unwrap_or_default(),
    })
}

fn write_l1_group(group: &Group, dataset: &Dataset, options: &Hdf5WriteOptions) -> Result<()> {
    group
        .new_attr::<u32>()
        .create("index")?
        .write_scalar(&dataset.index)?;

    write_epochs(&group.create_group("epochs")?, &dataset.epochs)?;
    if let Some(start) = &dataset.datataking_time_start {
        write_epochs(&group.create_group("datataking_time_start")?, start)?;
    }

    write_array(group, "electron_counts", &dataset.electron_counts, &COUNTS_AXES, options)?;
    write_array(group, "bg_counts", &dataset.bg_counts, &COUNTS_AXES, options)?;
    write_array(group, "data_quality", &dataset.data_quality, &COUNTS_AXES, options)?;

    let energy_ds = write_array(
        group,
        "measure_energy",
        &dataset.measure_energy,
        &ENERGY_AXES,
        options,
    )?;
    set_attr_str(&energy_ds, "units", "eV")?;

    let hv = group.create_group("output_hv")?;
    let electrodes: Vec<&str> = Electrode::ALL.iter().map(|e| e.name()).collect();
    set_attr_str_array(&hv, "electrode_names", &electrodes)?;
    let values = write_array(&hv, "values", &dataset.output_hv, &HV_AXES, options)?;
    set_attr_str(&values, "units", "V")?;

    let duration_ds = create_fixed_dataset::<f64, _>(
        group,
        "data_time_duration",
        (NUM_CYCLES,),
        None,
        false,
    )?;
    duration_ds.write(ArrayView1::from(dataset.data_time_duration.as_slice()))?;
    set_attr_str(&duration_ds, "units", "s")?;
    Ok(())
}

fn read_l1_group(group: &Group, fallback_index: u32) -> Result<Dataset> {
    let index = read_attr_opt::<u32>(group, "index")?.unwrap_or(fallback_index);
    let epochs = read_epochs(&group.group("epochs")?)?;
    let datataking_time_start = if group.link_exists("datataking_time_start") {
        Some(read_epochs(&group.group("datataking_time_start")?)?)
    } else {
        None
    };
    let hv = group.group("output_hv")?;

    Ok(Dataset {
        index,
        cycle_count: epochs.len(),
        epochs,
        electron_counts: read_array::<_, Ix4>(group, "electron_counts", &COUNTS_SHAPE)?,
        bg_counts: read_array::<_, Ix4>(group, "bg_counts", &COUNTS_SHAPE)?,
        measure_energy: read_array::<_, Ix2>(group, "measure_energy", &ENERGY_SHAPE)?,
        output_hv: read_array::<_, Ix4>(&hv, "values", &HV_SHAPE)?,
        datataking_time_start,
        data_time_duration: read_dataset_vec::<f64>(group, "data_time_duration")?,
        data_quality: read_array::<_, Ix4>(group, "data_quality", &COUNTS_SHAPE)?,
        global_attributes: GlobalAttributes::new(),
        anomalies: Vec::new(),
    })
}

fn write_epochs(group: &Group, epochs: &[Epoch]) -> Result<()> {
    let ms: Vec<u64> = epochs.iter().map(|e| e.timestamp_ms).collect();
    let ms_ds = create_fixed_dataset::<u64, _>(group, "timestamp_ms", (ms.len(),), None, false)?;
    ms_ds.write(ArrayView1::from(ms.as_slice()))?;
    set_attr_str(&ms_ds, "units", EPOCH_UNITS)?;

    let iso = epochs
        .iter()
        .map(|e| to_var_len_unicode(&e.iso_text()?))
        .collect::<Result<Vec<_>>>()?;
    let iso_ds =
        create_fixed_dataset::<VarLenUnicode, _>(group, "iso_format", (iso.len(),), None, false)?;
    iso_ds.write(ArrayView1::from(iso.as_slice()))?;
    Ok(())
}

fn read_epochs(group: &Group) -> Result<Vec<Epoch>> {
    to_epochs(read_dataset_vec::<u64>(group, "timestamp_ms")?)
}

fn to_epochs(ms: impl IntoIterator<Item = u64>) -> Result<Vec<Epoch>> {
    ms.into_iter()
        .enumerate()
        .map(|(cycle, ms)| Ok(Epoch::new(cycle, ms)?))
        .collect()
}

fn write_array<T: H5Type, S: Data<Elem = T>, D: Dimension>(
    group: &Group,
    name: &str,
    array: &ArrayBase<S, D>,
    axes: &[Axis],
    options: &Hdf5WriteOptions,
) -> Result<hdf5::Dataset> {
    let (compression, shuffle) = options.filters(array.len());
    let ds = create_fixed_dataset::<T, _>(group, name, array.shape().to_vec(), compression, shuffle)?;
    ds.write(array.view())?;
    set_axes_attr(&ds, axes)?;
    Ok(ds)
}

/// Reads a dataset of a known shape into an array of fixed rank.
fn read_array<T: H5Type, D: Dimension>(
    group: &Group,
    name: &str,
    shape: &[usize],
) -> Result<Array<T, D>> {
    let dataset = group.dataset(name)?;
    let found = dataset.shape();
    if found != shape {
        return Err(Error::InvalidFormat(format!(
            "{name} has shape {found:?}, expected {shape:?}"
        )));
    }
    let data = if dataset.size() == 0 {
        Vec::new()
    } else {
        dataset.read_raw::<T>()?
    };
    let array = Array::from_shape_vec(IxDyn(shape), data)
        .and_then(|array| array.into_dimensionality::<D>())
        .map_err(eltm_core::Error::from)?;
    Ok(array)
}

fn check_format(file: &File, expected: &str) -> Result<()> {
    match read_attr_opt_string(file, FORMAT_ATTR)? {
        Some(found) if found == expected => Ok(()),
        found => Err(Error::InvalidFormat(format!(
            "expected an {expected} container, found {found:?}"
        ))),
    }
}

fn write_global_attributes(location: &Location, attrs: &GlobalAttributes) -> Result<()> {
    let mut keys = Vec::with_capacity(attrs.len());
    for (key, value) in attrs.iter() {
        if key == FORMAT_ATTR || key == ORDER_ATTR {
            return Err(Error::InvalidFormat(format!(
                "global attribute name {key:?} is reserved"
            )));
        }
        set_attr_str(location, key, value)?;
        keys.push(key);
    }
    set_attr_str_array(location, ORDER_ATTR, &keys)
}

fn read_global_attributes(location: &Location) -> Result<Option<GlobalAttributes>> {
    let Ok(order) = location.attr(ORDER_ATTR) else {
        return Ok(None);
    };
    let mut attrs = GlobalAttributes::new();
    if order.size() == 0 {
        return Ok(Some(attrs));
    }
    let keys = order.read_raw::<VarLenUnicode>()?;
    for key in keys {
        let key = key.to_string();
        let value = read_attr_opt_string(location, &key)?.ok_or_else(|| {
            Error::InvalidFormat(format!("global attribute {key:?} is missing"))
        })?;
        attrs.insert(key, value);
    }
    Ok(Some(attrs))
}

fn create_fixed_dataset<T: H5Type, S>(
    group: &Group,
    name: &str,
    shape: S,
    compression: Option<u8>,
    shuffle: bool,
) -> Result<hdf5::Dataset>
where
    S: Into<hdf5::Extents>,
{
    let mut builder = group.new_dataset::<T>().shape(shape);

    if let Some(level) = compression {
        builder = builder.deflate(level);
    }

    if shuffle {
        builder = builder.shuffle();
    }

    Ok(builder.create(name)?)
}

fn set_axes_attr(location: &Location, axes: &[Axis]) -> Result<()> {
    let names: Vec<&str> = axes.iter().map(|a| a.name()).collect();
    set_attr_str_array(location, "axes", &names)
}

fn set_attr_str(location: &Location, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    location
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn set_attr_str_array(location: &Location, name: &str, values: &[&str]) -> Result<()> {
    let values: Vec<VarLenUnicode> = values
        .iter()
        .map(|v| to_var_len_unicode(v))
        .collect::<Result<Vec<_>>>()?;
    let attr = location
        .new_attr::<VarLenUnicode>()
        .shape((values.len(),))
        .create(name)?;
    if !values.is_empty() {
        attr.write(ArrayView1::from(values.as_slice()))?;
    }
    Ok(())
}

fn read_dataset_vec<T: H5Type>(group: &Group, name: &str) -> Result<Vec<T>> {
    let dataset = group.dataset(name)?;
    if dataset.size() == 0 {
        return Ok(Vec::new());
    }
    Ok(dataset.read_raw::<T>()?)
}

fn read_attr_opt<T: H5Type + Clone>(location: &Location, name: &str) -> Result<Option<T>> {
    match location.attr(name) {
        Ok(attr) => Ok(Some(attr.read_scalar::<T>()?)),
        Err(_) => Ok(None),
    }
}

fn read_attr_opt_string(location: &Location, name: &str) -> Result<Option<String>> {
    match location.attr(name) {
        Ok(attr) => {
            let value: VarLenUnicode = attr.read_scalar()?;
            Ok(Some(value.to_string()))
        }
        Err(_) => Ok(None),
    }
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 attribute: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use eltm_l1::SyntheticGenerator;
    use tempfile::NamedTempFile;

    fn attributes() -> GlobalAttributes {
        [("Project", "eltm"), ("Data_version", "3")].into_iter().collect()
    }

    #[test]
    fn test_hdf5_l1_roundtrip() {
        let mut generator = SyntheticGenerator::new(17);
        let datasets: Vec<Dataset> = (1..=2)
            .map(|i| {
                let mut d = generator.dataset(i).unwrap();
                d.global_attributes = attributes();
                d
            })
            .collect();

        let file = NamedTempFile::new().unwrap();
        write_l1_hdf5(file.path(), &datasets, &Hdf5WriteOptions::default()).unwrap();
        let loaded = read_l1_hdf5(file.path()).unwrap();
        assert_eq!(loaded, datasets);

        let keys: Vec<&str> = loaded[0].global_attributes.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Project", "Data_version"]);
    }

    #[test]
    fn test_hdf5_l1_group_layout() {
        let dataset = Dataset::zeroed(4);
        let file = NamedTempFile::new().unwrap();
        write_l1_hdf5(file.path(), &[dataset], &Hdf5WriteOptions::uncompressed()).unwrap();

        let h5 = File::open(file.path()).unwrap();
        let group = h5.group("bitstring_4").unwrap();
        assert_eq!(
            group.dataset("electron_counts").unwrap().shape(),
            vec![16, 7, 6, 45]
        );
        let iso = read_dataset_vec::<VarLenUnicode>(&group.group("epochs").unwrap(), "iso_format")
            .unwrap();
        assert_eq!(iso[0].as_str(), "1970-01-01T00:00:00.000Z");
        let hv = group.group("output_hv").unwrap();
        let names = hv.attr("electrode_names").unwrap().read_raw::<VarLenUnicode>().unwrap();
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn test_hdf5_l1_missing_start_times() {
        let mut dataset = Dataset::zeroed(1);
        dataset.datataking_time_start = None;
        let file = NamedTempFile::new().unwrap();
        write_l1_hdf5(file.path(), std::slice::from_ref(&dataset), &Hdf5WriteOptions::default())
            .unwrap();
        let loaded = read_l1_hdf5(file.path()).unwrap();
        assert_eq!(loaded[0].datataking_time_start, None);
        assert_eq!(loaded[0], dataset);
    }

    #[test]
    fn test_hdf5_l1_unreadable_start_times_are_an_error() {
        let file = NamedTempFile::new().unwrap();
        write_l1_hdf5(file.path(), &[Dataset::zeroed(1)], &Hdf5WriteOptions::uncompressed())
            .unwrap();
        {
            let h5 = File::open_rw(file.path()).unwrap();
            let group = h5.group("bitstring_1").unwrap();
            group.unlink("datataking_time_start").unwrap();
            group
                .new_dataset::<u64>()
                .shape((NUM_CYCLES,))
                .create("datataking_time_start")
                .unwrap();
        }
        assert!(matches!(read_l1_hdf5(file.path()), Err(Error::Hdf5(_))));
    }

    #[test]
    fn test_hdf5_l1_wrong_array_shape_rejected() {
        let file = NamedTempFile::new().unwrap();
        write_l1_hdf5(file.path(), &[Dataset::zeroed(1)], &Hdf5WriteOptions::uncompressed())
            .unwrap();
        {
            let h5 = File::open_rw(file.path()).unwrap();
            let group = h5.group("bitstring_1").unwrap();
            group.unlink("measure_energy").unwrap();
            group
                .new_dataset::<f64>()
                .shape((NUM_ENERGY, NUM_CYCLES - 1))
                .create("measure_energy")
                .unwrap();
        }
        assert!(matches!(read_l1_hdf5(file.path()), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_hdf5_l2_roundtrip_with_units() {
        let mut generator = SyntheticGenerator::new(18);
        let records: Vec<ReducedDataset> = (1..=3)
            .map(|i| eltm_l2::aggregate(&generator.dataset(i).unwrap()).unwrap())
            .collect();

        let file = NamedTempFile::new().unwrap();
        write_l2_hdf5(file.path(), &records, &attributes(), &Hdf5WriteOptions::default()).unwrap();

        let archive = read_l2_hdf5(file.path()).unwrap();
        assert_eq!(archive.records, records);
        assert_eq!(archive.global_attributes, attributes());

        let h5 = File::open(file.path()).unwrap();
        let epoch = h5.dataset("epoch").unwrap();
        assert_eq!(epoch.shape(), vec![3, 45]);
        assert_eq!(
            read_attr_opt_string(&epoch, "UNITS").unwrap().as_deref(),
            Some(EPOCH_UNITS)
        );
    }

    #[test]
    fn test_hdf5_l2_empty() {
        let file = NamedTempFile::new().unwrap();
        write_l2_hdf5(file.path(), &[], &GlobalAttributes::new(), &Hdf5WriteOptions::default())
            .unwrap();
        let archive = read_l2_hdf5(file.path()).unwrap();
        assert!(archive.records.is_empty());
        assert!(archive.global_attributes.is_empty());
    }

    #[test]
    fn test_hdf5_format_mismatch() {
        let file = NamedTempFile::new().unwrap();
        write_l2_hdf5(file.path(), &[], &GlobalAttributes::new(), &Hdf5WriteOptions::default())
            .unwrap();
        assert!(matches!(
            read_l1_hdf5(file.path()),
            Err(Error::InvalidFormat(_))
        ));
    }
}
