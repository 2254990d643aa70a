use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};

use anyhow::Result;
use ash::vk;

use bindle::{BindingSpace, CategorySizes, DescriptorCategory, DescriptorHeapLayout, SegregatedDescriptorTable};

mod framework;

#[test]
pub fn exhausting_one_category_leaves_others_usable() -> Result<()> {
    framework::init_logging();
    let sizes = CategorySizes::new()
        .with(DescriptorCategory::Texture2D, 2)
        .with(DescriptorCategory::Buffer, 3);
    let table = SegregatedDescriptorTable::new("scenario", &sizes, DescriptorHeapLayout::default())?;

    let textures = (0..2)
        .map(|_| table.allocate(DescriptorCategory::Texture2D))
        .collect::<Vec<_>>();
    let third = catch_unwind(AssertUnwindSafe(|| table.allocate(DescriptorCategory::Texture2D)));
    assert!(third.is_err(), "Third Texture2D allocation should be fatal");

    let buffers = (0..3)
        .map(|_| table.allocate(DescriptorCategory::Buffer))
        .collect::<Vec<_>>();
    assert_eq!(table.live_count(DescriptorCategory::Texture2D), 2);
    assert_eq!(table.live_count(DescriptorCategory::Buffer), 3);
    assert_eq!(table.total_live_count(), 5);

    for index in textures.into_iter().chain(buffers) {
        unsafe { table.release_immediate(index) };
    }
    assert_eq!(table.total_live_count(), 0);
    Ok(())
}

#[test]
#[should_panic(expected = "exhausted")]
pub fn allocating_from_unsized_category_panics() {
    let sizes = CategorySizes::new().with(DescriptorCategory::Buffer, 4);
    let table = SegregatedDescriptorTable::new("unsized", &sizes, DescriptorHeapLayout::default()).unwrap();
    table.allocate(DescriptorCategory::AccelerationStructure);
}

#[test]
pub fn sub_ranges_follow_category_order() -> Result<()> {
    // Built in reverse, laid out in canonical order anyway.
    let sizes = CategorySizes::new()
        .with(DescriptorCategory::Buffer, 10)
        .with(DescriptorCategory::RwTexture2D, 5)
        .with(DescriptorCategory::Texture2D, 20);
    let table = SegregatedDescriptorTable::new("ranges", &sizes, DescriptorHeapLayout::default())?;
    assert_eq!(table.heap_range(DescriptorCategory::Texture2D), 0..20);
    assert_eq!(table.heap_range(DescriptorCategory::RwTexture2D), 20..25);
    assert_eq!(table.heap_range(DescriptorCategory::TextureCube), 25..25);
    assert_eq!(table.heap_range(DescriptorCategory::RwTextureCube), 25..25);
    assert_eq!(table.heap_range(DescriptorCategory::Buffer), 25..35);
    assert_eq!(table.total_capacity(), 35);
    assert_eq!(table.category_of(0), Some(DescriptorCategory::Texture2D));
    assert_eq!(table.category_of(24), Some(DescriptorCategory::RwTexture2D));
    assert_eq!(table.category_of(34), Some(DescriptorCategory::Buffer));
    assert_eq!(table.category_of(35), None);
    Ok(())
}

#[test]
pub fn addresses_stay_inside_their_category() -> Result<()> {
    framework::init_logging();
    let layout = DescriptorHeapLayout::new(0x4000, 0x8000_0000, 64);
    let table = SegregatedDescriptorTable::new("containment", &framework::small_sizes(), layout)?;
    let categories = [
        DescriptorCategory::Texture2D,
        DescriptorCategory::RwTexture2D,
        DescriptorCategory::Buffer,
    ];

    let mut held = Vec::new();
    for round in 0..6 {
        for category in categories {
            if table.live_count(category) < table.capacity(category) {
                held.push(table.allocate(category));
            }
        }
        // Release every other index to shuffle the free-lists.
        if round % 2 == 1 {
            let released = held.split_off(held.len() / 2);
            for index in released {
                unsafe { table.release_immediate(index) };
            }
        }
        for index in &held {
            let range = table.heap_range(index.category());
            let address = table.address(*index);
            let slot = (address.gpu - layout.gpu_base) / layout.stride;
            assert!(
                range.contains(&slot),
                "{:?} resolved to slot {} outside {:?}",
                index,
                slot,
                range
            );
            assert_eq!((address.cpu - layout.cpu_base) as u64 / layout.stride, slot);
            assert_eq!(table.category_of(slot), Some(index.category()));
        }
    }

    let unique = held.iter().map(|index| table.address(*index)).collect::<HashSet<_>>();
    assert_eq!(unique.len(), held.len(), "Live indices should never share an address");
    for index in held {
        unsafe { table.release_immediate(index) };
    }
    Ok(())
}

#[test]
pub fn category_indices_are_local() -> Result<()> {
    let table = SegregatedDescriptorTable::new("local", &framework::small_sizes(), DescriptorHeapLayout::default())?;
    let texture = table.allocate(DescriptorCategory::Texture2D);
    let buffer = table.allocate(DescriptorCategory::Buffer);
    assert_eq!(texture.index().raw(), 0);
    assert_eq!(buffer.index().raw(), 0);
    assert_eq!(buffer.category(), DescriptorCategory::Buffer);
    assert!(table.is_allocated(buffer));
    assert_ne!(table.address(texture), table.address(buffer));
    unsafe {
        table.release_immediate(texture);
        table.release_immediate(buffer);
    }
    assert!(!table.is_allocated(buffer));
    Ok(())
}

#[test]
pub fn binding_spaces_are_fixed_and_distinct() {
    let spaces = DescriptorCategory::ALL
        .iter()
        .map(|category| category.binding_space())
        .collect::<HashSet<_>>();
    assert_eq!(spaces.len(), DescriptorCategory::COUNT, "No two categories may share a binding space");
    assert_eq!(
        DescriptorCategory::Texture2D.binding_space(),
        BindingSpace { set: 0, binding: 0 }
    );
    assert_eq!(
        DescriptorCategory::RwBuffer.binding_space(),
        BindingSpace { set: 1, binding: 2 }
    );
    for category in DescriptorCategory::ALL {
        assert_eq!(category.binding_space().set == 1, category.is_writable());
        assert_eq!(DescriptorCategory::ALL[category.slot()], category);
    }
}

#[test]
pub fn layout_bindings_cover_sized_categories() -> Result<()> {
    let table = SegregatedDescriptorTable::new("layout", &framework::small_sizes(), DescriptorHeapLayout::default())?;
    let bindings = table.layout_bindings();
    assert_eq!(bindings.len(), 3, "Only categories with a size get a binding");

    let (set, texture) = bindings[0];
    assert_eq!(set, 0);
    assert_eq!(texture.binding, 0);
    assert_eq!(texture.descriptor_count, 8);
    assert_eq!(texture.descriptor_type, vk::DescriptorType::SAMPLED_IMAGE);

    let (set, storage) = bindings[1];
    assert_eq!(set, 1);
    assert_eq!(storage.descriptor_type, vk::DescriptorType::STORAGE_IMAGE);
    assert_eq!(storage.descriptor_count, 4);

    let (set, buffer) = bindings[2];
    assert_eq!(set, 0);
    assert_eq!(buffer.binding, 2);
    assert_eq!(buffer.descriptor_type, vk::DescriptorType::STORAGE_BUFFER);
    Ok(())
}

#[test]
pub fn sizes_from_iterator() {
    let sizes = [(DescriptorCategory::TextureCube, 6), (DescriptorCategory::RwBuffer, 2)]
        .into_iter()
        .collect::<CategorySizes>();
    assert_eq!(sizes.get(DescriptorCategory::TextureCube), 6);
    assert_eq!(sizes.get(DescriptorCategory::Texture2D), 0);
    assert_eq!(sizes.total(), 8);
}

#[test]
#[should_panic(expected = "belongs to another table")]
pub fn releasing_into_another_table_panics() {
    let first = SegregatedDescriptorTable::new("first", &framework::small_sizes(), DescriptorHeapLayout::default()).unwrap();
    let second = SegregatedDescriptorTable::new("second", &framework::small_sizes(), DescriptorHeapLayout::default()).unwrap();
    let index = first.allocate(DescriptorCategory::Buffer);
    // Same category and the slot is live in `second` too, yet it must be refused.
    let _other = second.allocate(DescriptorCategory::Buffer);
    assert!(!second.is_allocated(index));
    unsafe { second.release_immediate(index) };
}
